// ============================================
// Served Contexts (曝光上下文)
// ============================================
//
// Remembers the query each chunk was last served to a user under, so
// feedback that arrives without a query still lands on the context arm
// the bandit read when it served the chunk.

use dashmap::DashMap;

#[derive(Default)]
pub struct ServedContexts {
    queries: DashMap<String, String>,
}

impl ServedContexts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: &str, chunk_id: &str, query: &str) {
        self.queries.insert(key(user_id, chunk_id), query.to_string());
    }

    /// Query a chunk was last served to this user for
    pub fn lookup(&self, user_id: &str, chunk_id: &str) -> Option<String> {
        self.queries
            .get(&key(user_id, chunk_id))
            .map(|entry| entry.value().clone())
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

fn key(user_id: &str, chunk_id: &str) -> String {
    format!("{}|{}", user_id, chunk_id)
}
