use std::cmp::Ordering;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tracing::{debug, instrument};

use super::SqliteBackend;
use crate::model::{Id, Page, PageRequest};
use crate::search::{
    FUZZY_THRESHOLD, HIGHLIGHT_END, HIGHLIGHT_START, SNIPPET_TOKENS, SearchDocument, SearchHit, SearchKind,
    SearchMode, SearchQuery, trigram,
};
use crate::storage::backend::SearchIndex;
use crate::storage::error::StorageResult;

fn hit_from_row(kind: SearchKind, row: &SqliteRow, with_highlight: bool) -> StorageResult<SearchHit> {
    Ok(SearchHit {
        kind,
        id: row.try_get("entity_id")?,
        name: row.try_get("name")?,
        rank: row.try_get("score")?,
        highlight: if with_highlight { row.try_get("highlight")? } else { None },
    })
}

impl SqliteBackend {
    async fn count_matches(&self, kind: SearchKind, expression: &str) -> StorageResult<u64> {
        let (total,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM search_documents WHERE search_documents MATCH ? AND kind = ?",
        )
        .bind(expression)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(total as u64)
    }

    async fn fts_search(
        &self,
        kind: SearchKind,
        expression: &str,
        page: PageRequest,
        with_highlight: bool,
    ) -> StorageResult<Page<SearchHit>> {
        let highlight = if with_highlight {
            format!(
                ", snippet(search_documents, -1, '{HIGHLIGHT_START}', '{HIGHLIGHT_END}', '…', {SNIPPET_TOKENS}) AS highlight"
            )
        } else {
            String::new()
        };
        let sql = format!(
            r#"
            SELECT entity_id, name, -bm25(search_documents) AS score{highlight}
            FROM search_documents
            WHERE search_documents MATCH ? AND kind = ?
            ORDER BY score DESC, entity_id
            LIMIT ? OFFSET ?
            "#
        );

        let rows = sqlx::query(&sql)
            .bind(expression)
            .bind(kind.as_str())
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        let items = rows
            .iter()
            .map(|row| hit_from_row(kind, row, with_highlight))
            .collect::<StorageResult<Vec<_>>>()?;
        let total = self.count_matches(kind, expression).await?;

        Ok(Page::new(items, total, page))
    }

    /// Scores every document of `kind` in process
    async fn fuzzy_search(
        &self,
        kind: SearchKind,
        query: &SearchQuery,
        page: PageRequest,
    ) -> StorageResult<Page<SearchHit>> {
        let rows = sqlx::query("SELECT entity_id, name, content FROM search_documents WHERE kind = ?")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        let needle = query.normalized();
        let mut hits = Vec::new();
        for row in &rows {
            let document = SearchDocument {
                kind,
                entity_id: row.try_get("entity_id")?,
                name: row.try_get("name")?,
                content: row.try_get("content")?,
            };

            let score = trigram::best_similarity(&needle, document.fields());
            if score >= FUZZY_THRESHOLD {
                hits.push(SearchHit {
                    kind,
                    id: document.entity_id,
                    name: document.name,
                    rank: score,
                    highlight: None,
                });
            }
        }

        hits.sort_by(|a, b| {
            b.rank
                .partial_cmp(&a.rank)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });

        let total = hits.len() as u64;
        let items = hits
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .collect();

        Ok(Page::new(items, total, page))
    }
}

#[async_trait]
impl SearchIndex for SqliteBackend {
    #[instrument(skip_all, fields(kind = %document.kind, id = document.entity_id))]
    async fn index_document(&self, document: &SearchDocument) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM search_documents WHERE kind = ? AND entity_id = ?")
            .bind(document.kind.as_str())
            .bind(document.entity_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO search_documents (kind, entity_id, name, content) VALUES (?, ?, ?, ?)")
            .bind(document.kind.as_str())
            .bind(document.entity_id)
            .bind(&document.name)
            .bind(&document.content)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_document(&self, kind: SearchKind, entity_id: Id) -> StorageResult<()> {
        sqlx::query("DELETE FROM search_documents WHERE kind = ? AND entity_id = ?")
            .bind(kind.as_str())
            .bind(entity_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self, query), fields(query = %query.normalized()))]
    async fn search(
        &self,
        kind: SearchKind,
        query: &SearchQuery,
        mode: SearchMode,
        page: PageRequest,
    ) -> StorageResult<Page<SearchHit>> {
        if query.is_empty() {
            return Ok(Page::empty(page));
        }

        let result = match query.fts_expression(mode) {
            Some(expression) => self.fts_search(kind, &expression, page, false).await?,
            None => self.fuzzy_search(kind, query, page).await?,
        };

        debug!("{} {:?} search matched {}", kind, mode, result.total);
        Ok(result)
    }

    #[instrument(skip(self, query), fields(query = %query.normalized()))]
    async fn search_highlight(
        &self,
        kind: SearchKind,
        query: &SearchQuery,
        page: PageRequest,
    ) -> StorageResult<Page<SearchHit>> {
        match query.fts_expression(SearchMode::FullText) {
            Some(expression) => self.fts_search(kind, &expression, page, true).await,
            None => Ok(Page::empty(page)),
        }
    }
}
