//! Query normalisation and FTS5 expression building.

use crate::model::ValidationError;

use super::SearchMode;

pub const MAX_QUERY_LENGTH: usize = 100;

/// A user query reduced to lowercase alphanumeric terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    terms: Vec<String>,
}

impl SearchQuery {
    /// Trims and tokenises `raw`.
    ///
    /// `-`, `_`, `.` and whitespace separate terms; any other
    /// non-alphanumeric character is dropped.
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        if trimmed.chars().count() > MAX_QUERY_LENGTH {
            return Err(ValidationError::new(
                "query",
                format!("must be at most {MAX_QUERY_LENGTH} characters"),
            ));
        }

        let mut terms = Vec::new();
        let mut current = String::new();
        for c in trimmed.chars() {
            if c.is_alphanumeric() {
                current.extend(c.to_lowercase());
            } else if c.is_whitespace() || matches!(c, '-' | '_' | '.') {
                if !current.is_empty() {
                    terms.push(std::mem::take(&mut current));
                }
            }
        }
        if !current.is_empty() {
            terms.push(current);
        }

        Ok(Self { terms })
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Terms joined by single spaces
    pub fn normalized(&self) -> String {
        self.terms.join(" ")
    }

    /// The FTS5 `MATCH` expression for `mode`.
    ///
    /// Each term is quoted so FTS5 never reads it as an operator or column
    /// filter. Returns `None` for an empty query and for fuzzy mode.
    pub fn fts_expression(&self, mode: SearchMode) -> Option<String> {
        if self.is_empty() {
            return None;
        }

        let last = self.terms.len() - 1;
        let expression = match mode {
            SearchMode::FullText => self
                .terms
                .iter()
                .enumerate()
                .map(|(i, term)| if i == last { format!("\"{term}\"*") } else { format!("\"{term}\"") })
                .collect::<Vec<_>>(),
            SearchMode::Prefix => self.terms.iter().map(|term| format!("\"{term}\"*")).collect(),
            SearchMode::Fuzzy => return None,
        };

        Some(expression.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_splits_on_separators() {
        let query = SearchQuery::parse("  Web-Server_01.prod  eu ").unwrap();
        assert_eq!(query.terms(), &["web", "server", "01", "prod", "eu"]);
    }

    #[test]
    fn test_parse_drops_operators() {
        let query = SearchQuery::parse("api* OR \"db\"").unwrap();
        assert_eq!(query.terms(), &["api", "or", "db"]);

        let query = SearchQuery::parse("a@b").unwrap();
        assert_eq!(query.terms(), &["ab"]);
    }

    #[test]
    fn test_parse_rejects_long_queries() {
        let long = "a".repeat(MAX_QUERY_LENGTH + 1);
        let err = SearchQuery::parse(&long).unwrap_err();
        assert_eq!(err.field, "query");

        // Surrounding whitespace does not count towards the limit
        let padded = format!("   {}   ", "a".repeat(MAX_QUERY_LENGTH));
        assert!(SearchQuery::parse(&padded).is_ok());
    }

    #[test]
    fn test_empty_queries() {
        assert!(SearchQuery::parse("").unwrap().is_empty());
        assert!(SearchQuery::parse(" *** ").unwrap().is_empty());
        assert_eq!(SearchQuery::parse("").unwrap().fts_expression(SearchMode::FullText), None);
    }

    #[test]
    fn test_fts_expressions() {
        let query = SearchQuery::parse("prod web").unwrap();
        assert_eq!(
            query.fts_expression(SearchMode::FullText).as_deref(),
            Some("\"prod\" \"web\"*")
        );
        assert_eq!(
            query.fts_expression(SearchMode::Prefix).as_deref(),
            Some("\"prod\"* \"web\"*")
        );
        assert_eq!(query.fts_expression(SearchMode::Fuzzy), None);
    }
}
