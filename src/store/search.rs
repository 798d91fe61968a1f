//! Hybrid search (C7 query path): fuse an FTS5 BM25 run with a `vec0` KNN
//! run via reciprocal-rank fusion (spec.md §4.4 "Hybrid search algorithm").

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, vec_to_blob, Embedder};
use crate::error::{Error, Result};
use crate::models::SearchResult;

const W_CONTENT: f64 = 10.0;
const W_TITLE: f64 = 1.0;
const W_URL: f64 = 5.0;
const W_PATH: f64 = 1.0;

#[derive(Debug, Clone)]
pub struct HybridSearchParams {
    pub rrf_constant: f64,
    pub candidate_multiplier: usize,
    pub final_limit: usize,
}

impl Default for HybridSearchParams {
    fn default() -> Self {
        Self {
            rrf_constant: 60.0,
            candidate_multiplier: 5,
            final_limit: 10,
        }
    }
}

struct CandidateRow {
    content: String,
    metadata: serde_json::Value,
}

/// Run the hybrid search for a single resolved `version_id`. If `embedder`
/// is `None` (or embedding fails), the search degrades to FTS-only,
/// returning FTS rank order (spec.md §4.4 "embedding-unavailable degrades
/// to FTS-only").
pub async fn hybrid_search(
    pool: &SqlitePool,
    version_id: i64,
    query: &str,
    embedder: Option<&dyn Embedder>,
    params: &HybridSearchParams,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() {
        return Ok(vec![]);
    }

    let candidate_k = (params.final_limit * params.candidate_multiplier).max(1);

    let fts_ranked = fts_run(pool, version_id, query, candidate_k).await?;

    let vec_ranked = match embedder {
        Some(embedder) => match embedder.embed_query(query).await {
            Ok(vector) => vec_run(pool, version_id, &vector, candidate_k).await.ok(),
            Err(_) => None,
        },
        None => None,
    };

    let Some(vec_ranked) = vec_ranked else {
        let mut out = Vec::with_capacity(fts_ranked.len());
        for (rank, (doc_id, row)) in fts_ranked.into_iter().enumerate() {
            let _ = doc_id;
            out.push(SearchResult {
                content: row.content,
                metadata: row.metadata,
                score: 1.0 / (params.rrf_constant + (rank + 1) as f64),
                rank: rank as i64 + 1,
            });
        }
        out.truncate(params.final_limit);
        return Ok(out);
    };

    let mut fused: HashMap<i64, f64> = HashMap::new();
    let mut fts_rank_by_id: HashMap<i64, usize> = HashMap::new();
    for (rank, (doc_id, _)) in fts_ranked.iter().enumerate() {
        fts_rank_by_id.insert(*doc_id, rank + 1);
        *fused.entry(*doc_id).or_insert(0.0) += 1.0 / (params.rrf_constant + (rank + 1) as f64);
    }
    for (rank, doc_id) in vec_ranked.iter().enumerate() {
        *fused.entry(*doc_id).or_insert(0.0) += 1.0 / (params.rrf_constant + (rank + 1) as f64);
    }

    let mut rows: HashMap<i64, CandidateRow> = HashMap::new();
    for (id, row) in fts_ranked {
        rows.insert(id, row);
    }
    for id in &vec_ranked {
        if !rows.contains_key(id) {
            if let Some(row) = fetch_document_row(pool, *id).await? {
                rows.insert(*id, row);
            }
        }
    }

    let mut ordered: Vec<(i64, f64)> = fused.into_iter().collect();
    ordered.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                let ra = fts_rank_by_id.get(&a.0).copied().unwrap_or(usize::MAX);
                let rb = fts_rank_by_id.get(&b.0).copied().unwrap_or(usize::MAX);
                ra.cmp(&rb)
            })
    });

    let mut out = Vec::with_capacity(params.final_limit);
    for (rank, (doc_id, score)) in ordered.into_iter().enumerate() {
        if out.len() >= params.final_limit {
            break;
        }
        let Some(row) = rows.remove(&doc_id) else { continue };
        out.push(SearchResult {
            content: row.content,
            metadata: row.metadata,
            score,
            rank: rank as i64 + 1,
        });
    }
    Ok(out)
}

async fn fts_run(
    pool: &SqlitePool,
    version_id: i64,
    query: &str,
    limit: usize,
) -> Result<Vec<(i64, CandidateRow)>> {
    let sql = format!(
        "SELECT d.id, d.content, d.metadata,
                bm25(documents_fts, {W_CONTENT}, {W_TITLE}, {W_URL}, {W_PATH}) AS rank
         FROM documents_fts
         JOIN documents d ON d.id = documents_fts.rowid
         WHERE documents_fts MATCH ? AND d.version_id = ?
         ORDER BY rank ASC
         LIMIT ?"
    );
    let rows = sqlx::query(&sql)
        .bind(query)
        .bind(version_id)
        .bind(limit as i64)
        .fetch_all(pool)
        .await
        .map_err(Error::from)?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let id: i64 = row.get(0);
            let content: String = row.get(1);
            let metadata_raw: String = row.get(2);
            let metadata = serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null);
            (id, CandidateRow { content, metadata })
        })
        .collect())
}

async fn vec_run(
    pool: &SqlitePool,
    version_id: i64,
    query_vector: &[f32],
    limit: usize,
) -> Result<Vec<i64>> {
    let sql = "SELECT rowid FROM documents_vec
               WHERE version_id = ? AND embedding MATCH ? AND k = ?
               ORDER BY distance ASC";
    let rows = sqlx::query(sql)
        .bind(version_id)
        .bind(vec_to_blob(query_vector))
        .bind(limit as i64)
        .fetch_all(pool)
        .await
        .map_err(Error::from)?;
    Ok(rows.into_iter().map(|row| row.get(0)).collect())
}

async fn fetch_document_row(pool: &SqlitePool, doc_id: i64) -> Result<Option<CandidateRow>> {
    let row = sqlx::query("SELECT content, metadata FROM documents WHERE id = ?")
        .bind(doc_id)
        .fetch_optional(pool)
        .await
        .map_err(Error::from)?;
    Ok(row.map(|row| {
        let content: String = row.get(0);
        let metadata_raw: String = row.get(1);
        CandidateRow {
            content,
            metadata: serde_json::from_str(&metadata_raw).unwrap_or(serde_json::Value::Null),
        }
    }))
}

/// Semver-aware resolution for `findBestVersion` (spec.md §4.4): exact
/// match for a full `major.minor.patch` request, highest matching
/// major[.minor] otherwise, or the unversioned row (`""`) when no version
/// is requested.
pub fn resolve_version_name(existing: &[String], requested: &str) -> Option<String> {
    if requested.is_empty() {
        return existing.iter().find(|n| n.is_empty()).cloned();
    }

    let req_parts: Vec<&str> = requested.split('.').collect();
    if req_parts.len() == 3 {
        return existing.iter().find(|n| n == requested).cloned();
    }

    let mut best: Option<(u64, u64, u64, String)> = None;
    for name in existing {
        if name.is_empty() {
            continue;
        }
        let Some((maj, min, pat)) = parse_loose_semver(name) else {
            continue;
        };
        let matches_prefix = match req_parts.len() {
            1 => req_parts[0].parse::<u64>().ok() == Some(maj),
            2 => {
                req_parts[0].parse::<u64>().ok() == Some(maj)
                    && req_parts[1].parse::<u64>().ok() == Some(min)
            }
            _ => false,
        };
        if !matches_prefix {
            continue;
        }
        let better = best
            .as_ref()
            .map(|b| (maj, min, pat) > (b.0, b.1, b.2))
            .unwrap_or(true);
        if better {
            best = Some((maj, min, pat, name.clone()));
        }
    }
    best.map(|(_, _, _, name)| name)
}

fn parse_loose_semver(s: &str) -> Option<(u64, u64, u64)> {
    let parts: Vec<&str> = s.split('.').collect();
    if parts.is_empty() || parts.len() > 3 {
        return None;
    }
    let mut nums = [0u64; 3];
    for (i, p) in parts.iter().enumerate() {
        nums[i] = p.parse().ok()?;
    }
    Some((nums[0], nums[1], nums[2]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use crate::store::SqliteStore;

    async fn temp_store() -> SqliteStore {
        let path = std::env::temp_dir().join(format!("dh-search-test-{}.sqlite", uuid::Uuid::new_v4()));
        SqliteStore::open(&path, 3).await.unwrap()
    }

    fn doc(url: &str, content: &str, sort_order: i64) -> Document {
        Document {
            id: 0,
            library_id: 0,
            version_id: 0,
            url: url.to_string(),
            content: content.to_string(),
            metadata: serde_json::json!({"title": ""}),
            sort_order,
        }
    }

    /// bm25 weights must be passed unnegated: a document that repeats the
    /// query term heavily should outrank one that merely mentions it once
    /// (spec.md §4.4 "rank ASC = best match first").
    #[tokio::test]
    async fn better_matching_document_ranks_first() {
        let store = temp_store().await;
        let lib_id = store.resolve_or_create_library("lib").await.unwrap();
        let ver_id = store.resolve_or_create_version(lib_id, "1.0.0").await.unwrap();

        store
            .upsert_documents_for_version(
                lib_id,
                ver_id,
                vec![
                    doc(
                        "u1",
                        "rust rust rust rust rust: ownership, borrowing, and the rust compiler",
                        0,
                    ),
                    doc("u2", "this page briefly mentions rust in passing, then moves on", 1),
                ],
                None,
            )
            .await
            .unwrap();

        let results = hybrid_search(store.pool(), ver_id, "rust", None, &HybridSearchParams::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "rust rust rust rust rust: ownership, borrowing, and the rust compiler");
        assert!(results[0].score >= results[1].score);
    }

    #[test]
    fn resolves_exact_full_version() {
        let existing = vec!["1.2.3".to_string(), "1.2.4".to_string()];
        assert_eq!(
            resolve_version_name(&existing, "1.2.3"),
            Some("1.2.3".to_string())
        );
    }

    #[test]
    fn resolves_partial_to_highest_patch() {
        let existing = vec!["1.2.3".to_string(), "1.2.9".to_string(), "1.3.0".to_string()];
        assert_eq!(
            resolve_version_name(&existing, "1.2"),
            Some("1.2.9".to_string())
        );
    }

    #[test]
    fn resolves_major_only_to_highest_overall() {
        let existing = vec!["1.2.3".to_string(), "1.9.0".to_string(), "2.0.0".to_string()];
        assert_eq!(
            resolve_version_name(&existing, "1"),
            Some("1.9.0".to_string())
        );
    }

    #[test]
    fn empty_request_resolves_to_unversioned_row() {
        let existing = vec!["".to_string(), "1.0.0".to_string()];
        assert_eq!(resolve_version_name(&existing, ""), Some("".to_string()));
    }

    #[test]
    fn no_match_returns_none() {
        let existing = vec!["1.0.0".to_string()];
        assert_eq!(resolve_version_name(&existing, "2"), None);
    }

    #[test]
    fn vec_blob_roundtrip_used_by_search() {
        let v = vec![0.1f32, 0.2, -0.3];
        assert_eq!(blob_to_vec(&vec_to_blob(&v)), v);
    }

    /// S6 (spec.md §8): 3 documents, FTS and vector ranks disagree, and the
    /// fused order follows reciprocal-rank fusion with c=60.
    #[test]
    fn s6_rrf_fusion_orders_by_combined_rank() {
        let c = 60.0;
        // doc A: fts rank 1, vec rank 3
        // doc B: fts rank 2, vec rank 1
        // doc C: fts rank 3, vec rank 2
        let score_a = 1.0 / (c + 1.0) + 1.0 / (c + 3.0);
        let score_b = 1.0 / (c + 2.0) + 1.0 / (c + 1.0);
        let score_c = 1.0 / (c + 3.0) + 1.0 / (c + 2.0);

        let mut scored = vec![("A", score_a), ("B", score_b), ("C", score_c)];
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

        assert_eq!(scored[0].0, "B");
        assert!(scored[1].1 >= scored[2].1);
    }
}
