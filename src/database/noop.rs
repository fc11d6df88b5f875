use std::path::Path;

use super::{Capabilities, Database, DatabaseError, Row};
use crate::query::{SelectStatement, Similarity};
use crate::types::{DocId, ResultRow, RowId};

/// Stand-in used when content storage is disabled. Every operation fails with
/// [`DatabaseError::Unsupported`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDatabase;

impl Database for NoopDatabase {
    fn capabilities(&self) -> Capabilities {
        Capabilities::empty()
    }

    fn load(&mut self, _dir: &Path) -> Result<(), DatabaseError> {
        Err(DatabaseError::unsupported("load"))
    }

    fn insert(&mut self, _rows: Vec<(RowId, Row)>) -> Result<(), DatabaseError> {
        Err(DatabaseError::unsupported("insert"))
    }

    fn delete(&mut self, _rows: &[RowId]) -> Result<usize, DatabaseError> {
        Err(DatabaseError::unsupported("delete"))
    }

    fn save(&self, _dir: &Path) -> Result<(), DatabaseError> {
        Err(DatabaseError::unsupported("save"))
    }

    fn ids(&self) -> Result<Vec<(RowId, DocId)>, DatabaseError> {
        Err(DatabaseError::unsupported("ids"))
    }

    fn resolve(&self, _row: RowId) -> Result<Option<ResultRow>, DatabaseError> {
        Err(DatabaseError::unsupported("resolve"))
    }

    fn embed(&self, _row: RowId) -> Result<Option<Vec<f32>>, DatabaseError> {
        Err(DatabaseError::unsupported("embed"))
    }

    fn query(
        &self,
        _sql: &str,
        _limit: usize,
        _similarity: &dyn Similarity,
    ) -> Result<Vec<ResultRow>, DatabaseError> {
        Err(DatabaseError::unsupported("query"))
    }

    fn execute(
        &self,
        _statement: &SelectStatement,
        _limit: usize,
        _similarity: &dyn Similarity,
    ) -> Result<Vec<ResultRow>, DatabaseError> {
        Err(DatabaseError::unsupported("execute"))
    }

    fn count(&self) -> Result<usize, DatabaseError> {
        Err(DatabaseError::unsupported("count"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RowId;

    fn no_similarity(_: &str, _: usize) -> Result<Vec<(RowId, f32)>, crate::query::QueryError> {
        Ok(Vec::new())
    }

    #[test]
    fn test_every_operation_is_unsupported() {
        let mut database = NoopDatabase;
        let dir = Path::new("/tmp");
        let unsupported = |result: Result<(), DatabaseError>| {
            assert!(matches!(result, Err(DatabaseError::Unsupported { .. })));
        };

        unsupported(database.load(dir));
        unsupported(database.insert(Vec::new()));
        unsupported(database.delete(&[RowId::new(0)]).map(|_| ()));
        unsupported(database.save(dir));
        unsupported(database.ids().map(|_| ()));
        unsupported(database.resolve(RowId::new(0)).map(|_| ()));
        unsupported(database.embed(RowId::new(0)).map(|_| ()));
        unsupported(database.query("select * from txtai", 10, &no_similarity).map(|_| ()));
        unsupported(
            database
                .execute(&SelectStatement::similarity("x", 1), 1, &no_similarity)
                .map(|_| ()),
        );
        unsupported(database.count().map(|_| ()));
    }
}
