//! Learned routing table: the connection each MAVLink address was last
//! heard on.

use crate::connection::ConnectionKey;
use std::collections::HashMap;

/// Map from `(system, component)` to the connection that endpoint was last
/// observed on. Last writer wins; entries never expire (a stale route is
/// corrected by the next frame from that address). Local frames never
/// create routes.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: HashMap<(u8, u8), ConnectionKey>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn learn(&mut self, system: u8, component: u8, key: ConnectionKey) {
        if key == ConnectionKey::Local {
            return;
        }
        self.routes.insert((system, component), key);
    }

    pub fn get(&self, system: u8, component: u8) -> Option<&ConnectionKey> {
        self.routes.get(&(system, component))
    }

    /// Connections holding routes that match a target under the wildcard
    /// rule: a zero in the target means "any", nonzero must match exactly.
    pub fn matching(
        &self,
        target_system: u8,
        target_component: u8,
    ) -> impl Iterator<Item = &ConnectionKey> {
        self.routes
            .iter()
            .filter(move |((system, component), _)| {
                (target_system == 0 || *system == target_system)
                    && (target_component == 0 || *component == target_component)
            })
            .map(|(_, key)| key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> ConnectionKey {
        ConnectionKey::Peer(0, format!("127.0.0.1:{}", port).parse().unwrap())
    }

    #[test]
    fn last_writer_wins() {
        let mut routes = RouteTable::new();
        routes.learn(1, 1, peer(40000));
        routes.learn(1, 1, peer(40001));
        assert_eq!(routes.get(1, 1), Some(&peer(40001)));
        assert_eq!(routes.len(), 1);
    }

    #[test]
    fn never_stores_local() {
        let mut routes = RouteTable::new();
        routes.learn(255, 190, ConnectionKey::Local);
        assert!(routes.is_empty());
    }

    #[test]
    fn wildcard_matching() {
        let mut routes = RouteTable::new();
        routes.learn(1, 1, peer(40000));
        routes.learn(1, 2, peer(40001));
        routes.learn(2, 1, peer(40002));

        let exact: Vec<_> = routes.matching(1, 1).collect();
        assert_eq!(exact, vec![&peer(40000)]);

        let mut whole_system: Vec<_> = routes.matching(1, 0).collect();
        whole_system.sort_by_key(|k| k.to_string());
        assert_eq!(whole_system, vec![&peer(40000), &peer(40001)]);

        assert_eq!(routes.matching(0, 0).count(), 3);
        assert_eq!(routes.matching(3, 0).count(), 0);
    }
}
