//! Scripted server setup and observers.

use std::sync::Arc;

use hyperlog::{EventState, EventStore, LogEntry, RequestDispatcher, StatusObserver};
use hyperlog_transport::MockTransport;
use parking_lot::Mutex;

use super::fixtures::{self, BASE};

/// Observer that records every status update it sees.
#[derive(Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<(String, EventState)>>,
}

impl RecordingObserver {
    pub fn states_for(&self, title: &str) -> Vec<EventState> {
        self.seen
            .lock()
            .iter()
            .filter(|(seen, _)| seen == title)
            .map(|(_, state)| *state)
            .collect()
    }

    /// Titles that reached `state`, in notification order.
    pub fn titles_in(&self, state: EventState) -> Vec<String> {
        self.seen
            .lock()
            .iter()
            .filter(|(_, seen)| *seen == state)
            .map(|(title, _)| title.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.lock().len()
    }
}

impl StatusObserver for RecordingObserver {
    fn update_status(&self, entry: &LogEntry) {
        self.seen
            .lock()
            .push((entry.title().to_string(), entry.state()));
    }
}

/// Mock server answering the object and list fixtures.
pub fn object_server() -> Arc<MockTransport> {
    let mock = Arc::new(MockTransport::new("fixtures"));
    mock.add_route(fixtures::OBJECT_PATH, fixtures::object());
    mock.add_route(fixtures::LAYOUT_PATH, fixtures::layout());
    mock.add_route(fixtures::ITEMS_PATH, fixtures::collection("items"));
    mock.add_route(fixtures::NOTES_PATH, fixtures::collection("notes"));
    mock.add_route(fixtures::LIST_PATH, fixtures::list());
    mock.add_route(fixtures::MEMBER_PATH, fixtures::member());
    mock.add_route(fixtures::MEMBER_LAYOUT_PATH, "{}");
    mock.add_route(fixtures::MEMBER_NAME_PATH, r#"{"id":"name"}"#);
    mock
}

pub struct Harness {
    pub mock: Arc<MockTransport>,
    pub store: Arc<EventStore>,
    pub observer: Arc<RecordingObserver>,
    pub dispatcher: Arc<RequestDispatcher>,
}

/// Dispatcher on `BASE` backed by `mock`, with a recording observer attached.
pub fn harness(mock: Arc<MockTransport>) -> Harness {
    let store = Arc::new(EventStore::new());
    let observer = Arc::new(RecordingObserver::default());
    store.add_observer(observer.clone());
    let dispatcher = Arc::new(
        RequestDispatcher::new(store.clone(), mock.clone()).with_base_url(BASE),
    );
    Harness {
        mock,
        store,
        observer,
        dispatcher,
    }
}
