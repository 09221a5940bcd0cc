use std::sync::Arc;

use crate::{
    core::request::Request,
    peer::{
        chooser::Chooser,
        facade::PeerFacade,
    },
    transport::peer::{
        ConnectionStatus,
        PeerIdentifier,
    },
};

/// A chooser that retains a single peer.
///
/// Additions beyond the first are ignored until the retained peer is
/// removed.
#[derive(Default)]
pub struct Single {
    facade: Option<Arc<PeerFacade>>,
}

impl Single {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Chooser for Single {
    fn add(&mut self, facade: Arc<PeerFacade>) {
        if self.facade.is_none() {
            self.facade = Some(facade);
        }
    }

    fn remove(&mut self, id: &PeerIdentifier) {
        if self
            .facade
            .as_ref()
            .is_some_and(|facade| facade.identifier() == id)
        {
            self.facade = None;
        }
    }

    fn choose(&mut self, _: &Request) -> Option<Arc<PeerFacade>> {
        self.facade
            .as_ref()
            .filter(|facade| facade.status().connection_status == ConnectionStatus::Available)
            .cloned()
    }
}

#[cfg(test)]
mod single_test {
    use std::sync::{
        Arc,
        Weak,
    };

    use crate::{
        core::request::Request,
        peer::{
            chooser::Chooser,
            facade::PeerFacade,
            single::Single,
        },
        transport::peer::ConnectionStatus,
    };

    fn facade(id: &str) -> Arc<PeerFacade> {
        let facade = Arc::new(PeerFacade::new(id.into(), Weak::new()));
        facade.set_cached_status(ConnectionStatus::Available);
        facade
    }

    #[test]
    fn returns_the_retained_peer_while_available() {
        let mut single = Single::new();
        assert!(single.choose(&Request::default()).is_none());

        let peer = facade("127.0.0.1:8080");
        single.add(peer.clone());
        assert_eq!(
            single
                .choose(&Request::default())
                .map(|facade| facade.identifier().clone()),
            Some("127.0.0.1:8080".into()),
        );

        peer.set_cached_status(ConnectionStatus::Unavailable);
        assert!(single.choose(&Request::default()).is_none());

        single.remove(&"127.0.0.1:8080".into());
        assert!(single.choose(&Request::default()).is_none());
    }

    #[test]
    fn ignores_additions_beyond_the_first() {
        let mut single = Single::new();
        single.add(facade("a"));
        single.add(facade("b"));
        assert_eq!(
            single
                .choose(&Request::default())
                .map(|facade| facade.identifier().clone()),
            Some("a".into()),
        );
    }
}
