//! The message pump is the dedicated reader thread of a buffered router. It owns the block for
//!  its entire life time, reading and dispatching messages until it is stopped or the transport
//!  fails.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info};
use crate::routing::message::Message;
use crate::routing::message_router::MessageRouter;
use crate::routing::transport::{GlobalMessageHandler, MessageDecoder};


#[derive(Default)]
pub(crate) struct PumpState {
    closing: bool,
    running: bool,
    /// incremented for every pump thread that is started. A pump thread only acts on the state
    ///  while it is the current generation, so a terminating pump can not stop its successor.
    generation: u64,
    /// a pump failure that was not reported to a caller yet
    last_error: Option<anyhow::Error>,
    /// NB: the pump thread is never joined - it may be blocked reading from the transport
    handle: Option<JoinHandle<()>>,
}

impl <M, D, G> MessageRouter<M, D, G>
where
    M: Message,
    D: MessageDecoder<M>,
    G: GlobalMessageHandler<M>,
{
    /// Starts the message pump thread if the router is buffered. This is a no-op for unbuffered
    ///  routers, if the pump is running already, or once the router is closing.
    pub fn start(self: &Arc<Self>) -> anyhow::Result<()> {
        if !self.is_buffered() {
            debug!("unbuffered router: no message pump");
            return Ok(());
        }

        let mut pump = self.pump.lock();
        if pump.closing {
            debug!("router is closing - not starting the message pump");
            return Ok(());
        }
        if pump.running {
            return Ok(());
        }

        let name = pump_thread_name(thread::current().name(), &self.config().pump_thread_name);
        debug!("starting message pump thread {}", name);

        let generation = pump.generation + 1;
        let router = self.clone();
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run(router, generation))?;

        pump.generation = generation;
        pump.running = true;
        pump.handle = Some(handle);
        Ok(())
    }

    pub fn is_pump_running(&self) -> bool {
        self.pump.lock().running
    }

    fn is_current_pump(&self, generation: u64) -> bool {
        let pump = self.pump.lock();
        pump.running && pump.generation == generation
    }

    /// Marks the router as closing. Transport failures after this point are expected and are
    ///  not reported to callers.
    pub fn signal_closing_state(&self) {
        self.pump.lock().closing = true;
    }

    pub fn is_closing(&self) -> bool {
        self.pump.lock().closing
    }

    pub(crate) fn stop_pump(&self) {
        let mut pump = self.pump.lock();
        pump.running = false;
        if pump.handle.take().is_some() {
            debug!("message pump signalled to stop");
        }
    }

    pub(crate) fn take_pump_error(&self) -> Option<anyhow::Error> {
        self.pump.lock().last_error.take()
    }

    fn on_pump_error(&self, generation: u64, e: anyhow::Error) {
        {
            let mut pump = self.pump.lock();
            if pump.generation == generation {
                pump.running = false;
            }
            if pump.closing {
                debug!("transport failed while closing: {:#}", e);
            }
            else {
                info!("message pump failed: {:#}", e);
                pump.last_error = Some(e);
            }
        }
        self.synchronizer().release_waiting();
    }
}

/// Pump threads started from a thread named e.g. `session-3` share its prefix `session-`
fn pump_thread_name(current: Option<&str>, base: &str) -> String {
    match current.and_then(|n| n.find('-').map(|idx| &n[..=idx])) {
        Some(prefix) => format!("{}{}", prefix, base),
        None => base.to_string(),
    }
}

/// Cleanup that must happen however the pump terminates
struct PumpExit<'a, M, D, G>
where
    M: Message,
    D: MessageDecoder<M>,
    G: GlobalMessageHandler<M>,
{
    router: &'a MessageRouter<M, D, G>,
    generation: u64,
}

impl <M, D, G> Drop for PumpExit<'_, M, D, G>
where
    M: Message,
    D: MessageDecoder<M>,
    G: GlobalMessageHandler<M>,
{
    fn drop(&mut self) {
        {
            let mut pump = self.router.pump.lock();
            if pump.generation == self.generation {
                pump.running = false;
            }
        }
        self.router.synchronizer().release_block();
        self.router.on_thread_exit();
        debug!("message pump #{} terminated", self.generation);
    }
}

fn run<M, D, G>(router: Arc<MessageRouter<M, D, G>>, generation: u64)
where
    M: Message,
    D: MessageDecoder<M>,
    G: GlobalMessageHandler<M>,
{
    router.synchronizer().acquire_block_for_pump();
    let _exit = PumpExit { router: &router, generation };

    while router.is_current_pump(generation) {
        match router.block_for_message() {
            Ok(()) => router.synchronizer().release_waiting(),
            Err(e) => {
                router.on_pump_error(generation, e);
                break;
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};
    use bytes::Bytes;
    use parking_lot::Mutex;
    use rstest::rstest;
    use crate::routing::error::RouterError;
    use crate::routing::message::AnyMessage;
    use crate::routing::router_config::RouterConfig;
    use crate::routing::transport::StoreGlobalMessages;
    use crate::test_util::message::TestMessage;
    use crate::test_util::transport::{frame_channel, FrameFeed};
    use super::*;

    type TestRouter = MessageRouter<TestMessage, fn(Bytes) -> anyhow::Result<TestMessage>, StoreGlobalMessages>;

    fn buffered_router() -> (FrameFeed, Arc<TestRouter>) {
        let (feed, reader) = frame_channel();
        let config = RouterConfig {
            wait_poll_interval: Duration::from_millis(10),
            ..RouterConfig::new_buffered(4)
        };
        let router = MessageRouter::new(config, Box::new(reader), TestMessage::deser as fn(Bytes) -> anyhow::Result<TestMessage>, StoreGlobalMessages)
            .unwrap();
        (feed, Arc::new(router))
    }

    fn await_pump_stopped(router: &TestRouter) {
        let start = Instant::now();
        while router.is_pump_running() {
            assert!(start.elapsed() < Duration::from_secs(5), "pump did not terminate");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[rstest]
    #[case::unnamed(None, "message-pump")]
    #[case::no_dash(Some("main"), "message-pump")]
    #[case::dash(Some("session-17"), "session-message-pump")]
    #[case::first_dash(Some("a-b-c"), "a-message-pump")]
    fn test_pump_thread_name(#[case] current: Option<&str>, #[case] expected: &str) {
        assert_eq!(pump_thread_name(current, "message-pump"), expected);
    }

    #[test]
    fn test_unbuffered_start_is_noop() {
        let (_feed, reader) = frame_channel();
        let router = Arc::new(MessageRouter::<TestMessage, _, _>::new(RouterConfig::new(1), Box::new(reader), TestMessage::deser, StoreGlobalMessages).unwrap());
        router.start().unwrap();
        assert!(!router.is_pump_running());
    }

    #[test]
    fn test_start_is_idempotent_and_exit_hook_runs_once() {
        let (feed, router) = buffered_router();
        let exits = Arc::new(AtomicUsize::new(0));
        let exit_thread_name = Arc::new(Mutex::new(None));
        {
            let exits = exits.clone();
            let exit_thread_name = exit_thread_name.clone();
            router.set_thread_exit_hook(move || {
                exits.fetch_add(1, Ordering::SeqCst);
                *exit_thread_name.lock() = thread::current().name().map(str::to_string);
            });
        }

        let router2 = router.clone();
        thread::Builder::new()
            .name("conn-1".to_string())
            .spawn(move || {
                router2.start().unwrap();
                router2.start().unwrap();
            })
            .unwrap()
            .join()
            .unwrap();
        assert!(router.is_pump_running());

        feed.fail("connection reset");
        await_pump_stopped(&router);
        // the exit hook runs after the pump is flagged as stopped
        let start = Instant::now();
        while exits.load(Ordering::SeqCst) == 0 {
            assert!(start.elapsed() < Duration::from_secs(5));
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(Duration::from_millis(20));

        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert_eq!(exit_thread_name.lock().as_deref(), Some("conn-message-pump"));
    }

    fn count_exits(router: &TestRouter) -> Arc<AtomicUsize> {
        let exits = Arc::new(AtomicUsize::new(0));
        let exits2 = exits.clone();
        router.set_thread_exit_hook(move || {
            exits2.fetch_add(1, Ordering::SeqCst);
        });
        exits
    }

    fn await_exits(exits: &AtomicUsize, expected: usize) {
        let start = Instant::now();
        while exits.load(Ordering::SeqCst) < expected {
            assert!(start.elapsed() < Duration::from_secs(5), "exit hook ran {} times, expected {}", exits.load(Ordering::SeqCst), expected);
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_exit_of_previous_pump_does_not_stop_its_successor() {
        let (feed, router) = buffered_router();
        let exits = count_exits(&router);
        router.start().unwrap();

        // an earlier pump finishing its cleanup after the current one was started
        drop(PumpExit { router: &*router, generation: 0 });

        assert!(router.is_pump_running());
        assert_eq!(exits.load(Ordering::SeqCst), 1);

        feed.send(&TestMessage::data(None, 7, b"still pumping"));
        let msg = router.next_message(None, &AnyMessage, Some(Duration::from_secs(5))).unwrap();
        assert_eq!(msg.seq, 7);

        router.stop();
    }

    #[test]
    fn test_restart_after_failure() {
        let (feed, router) = buffered_router();
        let exits = count_exits(&router);
        router.start().unwrap();

        for round in 1..=100u64 {
            feed.fail("connection reset");
            let start = Instant::now();
            let error = loop {
                if let Some(e) = router.take_pump_error() {
                    break e;
                }
                assert!(start.elapsed() < Duration::from_secs(5), "pump failure was not reported");
                thread::yield_now();
            };
            assert_eq!(error.to_string(), "connection reset");

            // restarting right away, possibly before the failed pump's thread terminated
            router.start().unwrap();
            feed.send(&TestMessage::data(None, round, b"after restart"));
            let msg = router.next_message(None, &AnyMessage, Some(Duration::from_secs(5))).unwrap();
            assert_eq!(msg.seq, round);
            assert!(router.is_pump_running());
        }

        // the exit hook is not consumed: it runs for every pump thread that terminates
        await_exits(&exits, 100);
        router.stop();
        drop(feed);
        await_exits(&exits, 101);
    }

    #[test]
    fn test_pump_failure_is_reported_to_one_caller() {
        let (feed, router) = buffered_router();
        router.start().unwrap();

        feed.send_frame(Bytes::from_static(b"\x09not a valid frame"));

        match router.next_message(None, &AnyMessage, Some(Duration::from_secs(5))) {
            Err(RouterError::TransportFailure(e)) => assert!(format!("{:#}", e).contains("invalid message kind")),
            other => panic!("expected transport failure, was {:?}", other),
        }

        // the pump is gone, so there is nothing left but waiting
        assert!(!router.is_pump_running());
        assert!(router.next_message(None, &AnyMessage, Some(Duration::from_millis(50))).unwrap_err().is_timeout());
    }

    #[test]
    fn test_failure_while_closing_is_discarded() {
        let (feed, router) = buffered_router();
        router.start().unwrap();

        router.signal_closing_state();
        assert!(router.is_closing());
        feed.fail("connection closed by peer");
        await_pump_stopped(&router);

        assert!(router.take_pump_error().is_none());
        assert!(router.next_message(None, &AnyMessage, Some(Duration::from_millis(30))).unwrap_err().is_timeout());

        // no restart once closing
        router.start().unwrap();
        assert!(!router.is_pump_running());
    }

    #[test]
    fn test_pump_delivers_while_callers_wait() {
        let (feed, router) = buffered_router();
        router.start().unwrap();

        let router2 = router.clone();
        let waiter = thread::spawn(move || router2.next_message(None, &AnyMessage, Some(Duration::from_secs(10))));

        feed.send(&TestMessage::data(None, 42, b"hello"));
        let msg = waiter.join().unwrap().unwrap();
        assert_eq!(msg.seq, 42);
        assert_eq!(msg.payload.as_ref(), b"hello");

        router.stop();
        assert!(!router.is_pump_running());
        assert!(router.is_closing());
    }
}
