use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use bytes::Bytes;

use super::adapter::{
    PostError, PostFuture, PostRequest, PostResponse, PostResult, PostTransport,
};

#[derive(Clone, Debug)]
pub struct MockResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl MockResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    pub fn text(status: u16, body: impl Into<String>) -> Self {
        Self::new(status, body.into())
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }
}

#[derive(Clone, Debug)]
pub enum MockBehavior {
    Pass,
    Delay(Duration),
    Fail(PostError),
}

#[derive(Debug, Default)]
struct MockTransportState {
    behaviors: VecDeque<MockBehavior>,
    default_queue: VecDeque<MockResponse>,
    route_queues: HashMap<String, VecDeque<MockResponse>>,
    outbound: Vec<PostRequest>,
}

/// In-memory transport recording every outbound request. Responses come from
/// a per-URL queue, then the default queue, then an empty 200 fallback.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_response(&self, response: MockResponse) {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while queueing response")
            .default_queue
            .push_back(response);
    }

    pub fn queue_response_for(&self, url: impl Into<String>, response: MockResponse) {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while queueing response by route")
            .route_queues
            .entry(url.into())
            .or_default()
            .push_back(response);
    }

    pub fn push_behavior(&self, behavior: MockBehavior) {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while pushing behavior")
            .behaviors
            .push_back(behavior);
    }

    pub fn requests(&self) -> Vec<PostRequest> {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while reading request log")
            .outbound
            .clone()
    }

    pub fn request_count(&self) -> usize {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while reading request count")
            .outbound
            .len()
    }

    pub fn last_url(&self) -> Option<String> {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while reading last url")
            .outbound
            .last()
            .map(|request| request.url.to_string())
    }

    fn pop_behavior(&self) -> MockBehavior {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while reading behavior plan")
            .behaviors
            .pop_front()
            .unwrap_or(MockBehavior::Pass)
    }

    fn record(&self, request: PostRequest) {
        self.state
            .lock()
            .expect("onepost mock mutex poisoned while recording request")
            .outbound
            .push(request);
    }

    fn next_response(&self, request: &PostRequest) -> Option<MockResponse> {
        let mut state = self
            .state
            .lock()
            .expect("onepost mock mutex poisoned while selecting response");
        if let Some(queue) = state.route_queues.get_mut(request.url.as_str()) {
            if let Some(response) = queue.pop_front() {
                return Some(response);
            }
        }
        state.default_queue.pop_front()
    }
}

impl PostTransport for MockTransport {
    fn execute(&self, request: PostRequest) -> PostFuture<PostResult<PostResponse>> {
        let transport = self.clone();
        Box::pin(async move {
            let behavior = transport.pop_behavior();
            if let MockBehavior::Delay(duration) = &behavior {
                std::thread::sleep(*duration);
            }

            let start = Instant::now();
            transport.record(request.clone());

            if let MockBehavior::Fail(error) = behavior {
                return Err(error);
            }

            let response = transport
                .next_response(&request)
                .unwrap_or_else(|| MockResponse::new(200, Bytes::new()));

            Ok(PostResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
                elapsed: start.elapsed(),
            })
        })
    }
}
