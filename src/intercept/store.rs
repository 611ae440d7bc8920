//! Paused-exchange store
//!
//! Holds, per exchange id, everything needed to resume a paused exchange
//! later. An entry lives exactly as long as its exchange is paused.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::cdp::HeaderEntry;

use super::ids::{ExchangeId, TargetId};

/// Stage an exchange was paused at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Request,
    Response,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Request => write!(f, "request"),
            Self::Response => write!(f, "response"),
        }
    }
}

/// Response side of an exchange
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseMeta {
    pub status: i64,
    pub status_text: String,
    pub headers: Vec<HeaderEntry>,
}

/// Snapshot of a paused exchange
#[derive(Debug, Clone, PartialEq)]
pub struct PausedExchange {
    pub id: ExchangeId,
    pub target: TargetId,
    pub direction: Direction,
    pub url: String,
    pub method: String,
    /// Request headers in protocol order
    pub headers: Vec<HeaderEntry>,
    /// Request body, when the protocol supplied one
    pub body: Option<String>,
    /// Captured status and headers; set at the response stage or by a late
    /// `Network.responseReceived`
    pub response: Option<ResponseMeta>,
    pub resource_category: String,
    /// `Network` domain id of the same exchange
    pub network_id: Option<String>,
    pub captured_at: DateTime<Utc>,
}

/// Store of paused exchanges, keyed by exchange id
#[derive(Debug, Default)]
pub struct ExchangeStore {
    exchanges: HashMap<ExchangeId, PausedExchange>,
}

impl ExchangeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an exchange, replacing any earlier pause with the same id
    pub fn put(&mut self, exchange: PausedExchange) -> Option<PausedExchange> {
        let previous = self.exchanges.insert(exchange.id.clone(), exchange);
        if let Some(prev) = &previous {
            tracing::debug!(
                exchange = %prev.id,
                previous = %prev.direction,
                "Exchange re-presented; replacing stored entry"
            );
        }
        previous
    }

    pub fn get(&self, id: &ExchangeId) -> Option<&PausedExchange> {
        self.exchanges.get(id)
    }

    pub fn remove(&mut self, id: &ExchangeId) -> Option<PausedExchange> {
        self.exchanges.remove(id)
    }

    /// Drop every exchange belonging to a target, returning their ids
    pub fn clear(&mut self, target: &TargetId) -> Vec<ExchangeId> {
        let ids: Vec<ExchangeId> = self
            .exchanges
            .values()
            .filter(|e| &e.target == target)
            .map(|e| e.id.clone())
            .collect();

        for id in &ids {
            self.exchanges.remove(id);
        }

        if !ids.is_empty() {
            tracing::debug!(tab = %target, purged = ids.len(), "Purged paused exchanges");
        }
        ids
    }

    /// Record response metadata that arrived outside a pause
    ///
    /// `key` may be the exchange id or the network id of a stored exchange
    /// on the same target. Returns whether an exchange was updated.
    pub fn attach_response_metadata(
        &mut self,
        target: &TargetId,
        key: &str,
        meta: ResponseMeta,
    ) -> bool {
        let exchange = self.exchanges.values_mut().find(|e| {
            &e.target == target && (e.id.as_str() == key || e.network_id.as_deref() == Some(key))
        });

        match exchange {
            Some(exchange) => {
                exchange.response = Some(meta);
                true
            }
            None => false,
        }
    }

    /// Paused exchanges, oldest first, optionally for one target
    pub fn pending(&self, target: Option<&TargetId>) -> Vec<&PausedExchange> {
        let mut pending: Vec<&PausedExchange> = self
            .exchanges
            .values()
            .filter(|e| target.map_or(true, |t| &e.target == t))
            .collect();
        pending.sort_by(|a, b| a.captured_at.cmp(&b.captured_at).then(a.id.cmp(&b.id)));
        pending
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exchange(id: &str, target: &str, direction: Direction) -> PausedExchange {
        PausedExchange {
            id: ExchangeId::new(id),
            target: TargetId::new(target),
            direction,
            url: "https://example.com/".to_string(),
            method: "GET".to_string(),
            headers: Vec::new(),
            body: None,
            response: None,
            resource_category: "Document".to_string(),
            network_id: Some(format!("net-{}", id)),
            captured_at: Utc::now(),
        }
    }

    #[test]
    fn test_put_get_remove() {
        let mut store = ExchangeStore::new();
        assert!(store.put(exchange("a", "T1", Direction::Request)).is_none());
        assert!(store.get(&ExchangeId::new("a")).is_some());
        assert!(store.remove(&ExchangeId::new("a")).is_some());
        assert!(store.remove(&ExchangeId::new("a")).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn test_later_pause_overwrites() {
        let mut store = ExchangeStore::new();
        store.put(exchange("a", "T1", Direction::Request));
        let previous = store.put(exchange("a", "T1", Direction::Response));
        assert_eq!(previous.map(|e| e.direction), Some(Direction::Request));
        assert_eq!(store.len(), 1);
        assert_eq!(
            store.get(&ExchangeId::new("a")).map(|e| e.direction),
            Some(Direction::Response)
        );
    }

    #[test]
    fn test_clear_only_touches_target() {
        let mut store = ExchangeStore::new();
        store.put(exchange("a", "T1", Direction::Request));
        store.put(exchange("b", "T1", Direction::Response));
        store.put(exchange("c", "T2", Direction::Request));

        let mut purged = store.clear(&TargetId::new("T1"));
        purged.sort();
        assert_eq!(purged, vec![ExchangeId::new("a"), ExchangeId::new("b")]);
        assert_eq!(store.len(), 1);
        assert!(store.get(&ExchangeId::new("c")).is_some());
    }

    #[test]
    fn test_response_metadata_by_network_id() {
        let mut store = ExchangeStore::new();
        store.put(exchange("a", "T1", Direction::Request));

        let meta = ResponseMeta {
            status: 204,
            status_text: "No Content".to_string(),
            headers: vec![HeaderEntry::new("X", "Y")],
        };
        assert!(store.attach_response_metadata(&TargetId::new("T1"), "net-a", meta.clone()));
        assert_eq!(store.get(&ExchangeId::new("a")).unwrap().response, Some(meta.clone()));

        // other targets never match
        assert!(!store.attach_response_metadata(&TargetId::new("T2"), "net-a", meta));
    }

    #[test]
    fn test_pending_filter() {
        let mut store = ExchangeStore::new();
        store.put(exchange("a", "T1", Direction::Request));
        store.put(exchange("b", "T2", Direction::Request));
        assert_eq!(store.pending(None).len(), 2);
        assert_eq!(store.pending(Some(&TargetId::new("T2"))).len(), 1);
    }
}
