//! Query orchestration: retrieval, context packing, answer synthesis.
//!
//! Retrieval prefers the vector index and falls back to the lexical index
//! whenever the vector path is unavailable, empty, or fails at query time.
//! Synthesis is likewise best-effort: without a chat model (or after its
//! credentials were rejected) the packed extracts themselves become the
//! answer, still carrying page-accurate citations.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::capability::Capabilities;
use crate::config::Config;
use crate::embedding::embed_query;
use crate::lexical::LexicalIndex;
use crate::llm::ChatError;
use crate::models::{Answer, MappingEntry, SearchHit, SourceRef};
use crate::store::MappingStore;
use crate::vector::VectorIndex;

pub const MISSING_QUERY_MSG: &str = "Please provide a question to answer.";
pub const NO_EXTRACTS_MSG: &str = "No matching passages were found in the indexed \
documents. Try re-running `pdx index`, or rephrase the question.";

const SYNTHESIS_SYSTEM: &str = "You answer questions using only the provided document \
extracts. Cite the document title and page number for every claim, in the form \
(Title, p. N). If the extracts do not contain the answer, say so plainly.";

/// Retrieve ranked hits for a query: vector path first, lexical fallback.
/// Results are deduplicated by source identity.
pub async fn retrieve(
    config: &Config,
    caps: &Capabilities,
    lexical: &mut LexicalIndex,
    query: &str,
    k: Option<usize>,
) -> Vec<SearchHit> {
    let data_dir = &config.storage.data_dir;
    lexical.ensure_fresh(data_dir);
    let top_k = k.unwrap_or(config.retrieval.top_k);

    if caps.embedder.is_enabled() {
        let index = VectorIndex::load(data_dir, caps.embedder.dims());
        if !index.is_empty() {
            match embed_query(caps.embedder.as_ref(), query).await {
                Ok(query_vec) => {
                    let hits: Vec<SearchHit> = index
                        .search(&query_vec, top_k)
                        .into_iter()
                        .filter_map(|(row, score)| {
                            lexical
                                .records()
                                .get(row)
                                .map(|r| SearchHit::from_record(r, score as f64))
                        })
                        .collect();
                    if !hits.is_empty() {
                        return dedup_hits(hits);
                    }
                }
                Err(e) => warn!("Query embedding failed, using lexical fallback: {}", e),
            }
        }
    }

    dedup_hits(lexical.search(query, top_k, config.retrieval.min_score))
}

/// Drop hits that cite the same source location, keeping rank order.
fn dedup_hits(hits: Vec<SearchHit>) -> Vec<SearchHit> {
    let mut seen = HashSet::new();
    hits.into_iter()
        .filter(|h| seen.insert((h.title.clone(), h.page, h.path.clone(), h.url.clone())))
        .collect()
}

fn format_block(hit: &SearchHit) -> String {
    format!("[{} - p.{}]\n{}", hit.title, hit.page, hit.text)
}

/// Greedily pack hit blocks into the character budget, in rank order. A
/// block that does not fit is skipped and packing continues with later,
/// smaller blocks. Returns the packed context and the hits it contains.
pub fn pack_context(hits: &[SearchHit], budget_chars: usize) -> (String, Vec<SearchHit>) {
    let mut blocks: Vec<String> = Vec::new();
    let mut packed: Vec<SearchHit> = Vec::new();
    let mut used = 0usize;

    for hit in hits {
        let block = format_block(hit);
        let cost = block.chars().count() + if blocks.is_empty() { 0 } else { 2 };
        if used + cost > budget_chars {
            continue;
        }
        used += cost;
        blocks.push(block);
        packed.push(hit.clone());
    }

    (blocks.join("\n\n"), packed)
}

fn build_user_prompt(context: &str, query: &str) -> String {
    format!("Extracts:\n\n{}\n\nQuestion: {}", context, query)
}

/// Answer a question with citations. Never fails: every degradation path
/// yields a usable [`Answer`].
pub async fn ask_with_sources(
    config: &Config,
    caps: &Capabilities,
    lexical: &mut LexicalIndex,
    llm_disabled: &AtomicBool,
    query: &str,
    k: Option<usize>,
) -> Answer {
    let query = query.trim();
    if query.is_empty() {
        return Answer {
            answer: MISSING_QUERY_MSG.to_string(),
            sources: Vec::new(),
        };
    }

    let hits = retrieve(config, caps, lexical, query, k).await;
    if hits.is_empty() {
        return Answer {
            answer: NO_EXTRACTS_MSG.to_string(),
            sources: Vec::new(),
        };
    }

    let (context, packed) = pack_context(&hits, config.retrieval.context_budget_chars);
    let sources: Vec<SourceRef> = packed.iter().map(SourceRef::from_hit).collect();

    let answer = synthesize(caps, llm_disabled, &context, query).await;
    Answer { answer, sources }
}

/// Run the chat model over the packed context; on any failure the context
/// itself is the answer. An auth failure disables synthesis for the rest of
/// the process.
pub async fn synthesize(
    caps: &Capabilities,
    llm_disabled: &AtomicBool,
    context: &str,
    query: &str,
) -> String {
    if !caps.chat.is_enabled() || llm_disabled.load(Ordering::Relaxed) {
        return context.to_string();
    }
    match caps
        .chat
        .complete(SYNTHESIS_SYSTEM, &build_user_prompt(context, query))
        .await
    {
        Ok(answer) => answer,
        Err(ChatError::Auth(e)) => {
            warn!("LLM credentials rejected, disabling synthesis: {}", e);
            llm_disabled.store(true, Ordering::Relaxed);
            context.to_string()
        }
        Err(e) => {
            warn!("Synthesis failed, returning raw extracts: {}", e);
            context.to_string()
        }
    }
}

pub(crate) fn synthesis_prompts(context: &str, query: &str) -> (String, String) {
    (
        SYNTHESIS_SYSTEM.to_string(),
        build_user_prompt(context, query),
    )
}

/// Re-segment a completed answer into word bursts for pseudo-streaming.
/// Longer answers get proportionally larger bursts so the burst count stays
/// roughly constant.
pub fn word_bursts(text: &str) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return Vec::new();
    }
    let burst = (words.len() / 40).max(6);
    let last = words.chunks(burst).count() - 1;
    words
        .chunks(burst)
        .enumerate()
        .map(|(i, chunk)| {
            let mut s = chunk.join(" ");
            if i != last {
                s.push(' ');
            }
            s
        })
        .collect()
}

/// Offline keyword search over the lexical index, for diagnostics and the
/// `search` command.
pub fn keyword_search(
    data_dir: &Path,
    lexical: &mut LexicalIndex,
    query: &str,
    top_k: usize,
    min_score: f64,
) -> Vec<SearchHit> {
    lexical.ensure_fresh(data_dir);
    lexical.search(query, top_k, min_score)
}

/// Build an openable URI for a mapping entry at a given page. Local paths
/// win over remote URLs. A URL that already carries a fragment gets the
/// page as a query parameter instead of a second fragment.
pub fn resolve_source_uri(entry: &MappingEntry, page: u32) -> Option<String> {
    if let Some(path) = &entry.path {
        let abs = absolutize(path);
        return Some(format!("file://{}#page={}", abs.display(), page));
    }
    if let Some(url) = &entry.url {
        if let Some(pos) = url.find('#') {
            let (base, fragment) = url.split_at(pos);
            return Some(format!("{}?page={}{}", base, page, fragment));
        }
        return Some(format!("{}#page={}", url, page));
    }
    None
}

fn absolutize(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Open a document at a page with the platform handler. Returns the URI
/// that was launched.
pub fn open_source(data_dir: &Path, basename: &str, page: u32) -> Result<String> {
    let mapping = MappingStore::load(data_dir);
    let entry = mapping
        .resolve(basename)
        .with_context(|| format!("Cannot open {}: no known location", basename))?;
    let uri = resolve_source_uri(entry, page)
        .with_context(|| format!("Cannot open {}: no path or URL recorded", basename))?;
    launch(&uri)?;
    info!("Opened {}", uri);
    Ok(uri)
}

fn launch(uri: &str) -> Result<()> {
    #[cfg(target_os = "macos")]
    let opener = "open";
    #[cfg(not(target_os = "macos"))]
    let opener = "xdg-open";

    std::process::Command::new(opener)
        .arg(uri)
        .spawn()
        .with_context(|| format!("Cannot open {} with {}", uri, opener))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(title: &str, page: u32, text: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            page,
            text: text.to_string(),
            score: 1.0,
            path: None,
            url: None,
        }
    }

    #[test]
    fn pack_skips_oversized_block_and_continues() {
        let hits = vec![
            hit("A.pdf", 1, "short"),
            hit("A.pdf", 2, &"x".repeat(500)),
            hit("A.pdf", 3, "also short"),
        ];
        let (context, packed) = pack_context(&hits, 100);
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].page, 1);
        assert_eq!(packed[1].page, 3);
        assert!(context.contains("[A.pdf - p.1]"));
        assert!(context.contains("[A.pdf - p.3]"));
        assert!(!context.contains("xxx"));
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let hits = vec![hit("A.pdf", 1, "first"), hit("A.pdf", 1, "second"), hit("A.pdf", 2, "other")];
        let deduped = dedup_hits(hits);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].text, "first");
        assert_eq!(deduped[1].page, 2);
    }

    #[test]
    fn word_bursts_reassemble_to_original() {
        let text = (0..200).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
        let bursts = word_bursts(&text);
        assert!(bursts.len() > 1);
        assert_eq!(bursts.concat(), text);
        assert!(word_bursts("").is_empty());
    }

    #[test]
    fn uri_for_local_path_uses_page_fragment() {
        let entry = MappingEntry {
            path: Some(PathBuf::from("/x/doc.pdf")),
            url: None,
        };
        assert_eq!(
            resolve_source_uri(&entry, 4).unwrap(),
            "file:///x/doc.pdf#page=4"
        );
    }

    #[test]
    fn uri_prefers_path_over_url() {
        let entry = MappingEntry {
            path: Some(PathBuf::from("/x/doc.pdf")),
            url: Some("https://example.com/doc.pdf".to_string()),
        };
        assert!(resolve_source_uri(&entry, 2).unwrap().starts_with("file://"));
    }

    #[test]
    fn uri_for_url_respects_existing_fragment() {
        let plain = MappingEntry {
            path: None,
            url: Some("https://example.com/doc.pdf".to_string()),
        };
        assert_eq!(
            resolve_source_uri(&plain, 3).unwrap(),
            "https://example.com/doc.pdf#page=3"
        );

        let fragmented = MappingEntry {
            path: None,
            url: Some("https://example.com/doc.pdf#section".to_string()),
        };
        assert_eq!(
            resolve_source_uri(&fragmented, 3).unwrap(),
            "https://example.com/doc.pdf?page=3#section"
        );
    }

    #[test]
    fn uri_requires_some_location() {
        assert!(resolve_source_uri(&MappingEntry::default(), 1).is_none());
    }

    #[tokio::test]
    async fn empty_query_short_circuits() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let caps = Capabilities::none();
        let mut lexical = LexicalIndex::default();
        let disabled = AtomicBool::new(false);

        let answer = ask_with_sources(&config, &caps, &mut lexical, &disabled, "   ", None).await;
        assert_eq!(answer.answer, MISSING_QUERY_MSG);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn no_hits_yields_no_extracts_message() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        let caps = Capabilities::none();
        let mut lexical = LexicalIndex::default();
        let disabled = AtomicBool::new(false);

        let answer =
            ask_with_sources(&config, &caps, &mut lexical, &disabled, "anything", None).await;
        assert_eq!(answer.answer, NO_EXTRACTS_MSG);
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn degraded_answer_is_raw_context_with_sources() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        crate::store::save_json(
            &tmp.path().join("data").join(crate::metadata::CHUNKS_FILE),
            &vec![crate::models::ChunkRecord {
                title: "A.pdf".to_string(),
                page: 2,
                text: "the mitochondria is the powerhouse".to_string(),
                path: None,
                url: None,
            }],
        )
        .unwrap();

        let caps = Capabilities::none();
        let mut lexical = LexicalIndex::default();
        let disabled = AtomicBool::new(false);

        let answer =
            ask_with_sources(&config, &caps, &mut lexical, &disabled, "mitochondria", None).await;
        assert!(answer.answer.contains("[A.pdf - p.2]"));
        assert!(answer.answer.contains("powerhouse"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(answer.sources[0].title, "A.pdf");
        assert_eq!(answer.sources[0].page, 2);
    }

    fn test_config(dir: &Path) -> Config {
        let data = dir.join("data");
        std::fs::create_dir_all(&data).unwrap();
        let body = format!(
            r#"
[storage]
data_dir = "{}"

[scan]
roots = ["{}"]
"#,
            data.display(),
            dir.display()
        );
        let path = dir.join("cfg.toml");
        std::fs::write(&path, body).unwrap();
        crate::config::load_config(&path).unwrap()
    }
}
