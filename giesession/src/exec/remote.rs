// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Blocking remote calls with an optional deadline
//!
//! Without a deadline the call runs on the caller's thread. With one, it runs
//! on the session's bounded remote pool and the caller stops waiting once the
//! deadline passes. An abandoned call keeps its pool thread until the remote
//! side answers; when every thread is held that way, later calls queue and
//! time out in turn instead of spawning more threads.

use crate::cluster::RemoteError;
use crate::error::{SessionError, SessionResult};
use log::warn;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

pub(crate) struct RemoteCaller {
    timeout: Option<Duration>,
    /// Only built when calls have a deadline
    pool: Option<ThreadPool>,
}

impl RemoteCaller {
    pub(crate) fn new(timeout: Option<Duration>, threads: usize) -> SessionResult<Self> {
        let pool = match timeout {
            Some(_) => Some(
                ThreadPoolBuilder::new()
                    .num_threads(threads)
                    .thread_name(|i| format!("giesession-remote-{}", i))
                    .build()
                    .map_err(|e| {
                        SessionError::Config(format!("cannot build remote call pool: {}", e))
                    })?,
            ),
            None => None,
        };
        Ok(Self { timeout, pool })
    }

    /// Run `f`, returning the remote reply or a local timeout error
    ///
    /// The outer result carries local failures; the inner one is whatever
    /// the remote side answered.
    pub(crate) fn call<T, F>(&self, name: &str, f: F) -> SessionResult<Result<T, RemoteError>>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    {
        let (limit, pool) = match (self.timeout, &self.pool) {
            (Some(limit), Some(pool)) => (limit, pool),
            _ => return Ok(f()),
        };

        let (tx, rx) = mpsc::sync_channel(1);
        pool.spawn(move || {
            let _ = tx.send(f());
        });

        match rx.recv_timeout(limit) {
            Ok(reply) => Ok(reply),
            Err(RecvTimeoutError::Timeout) => {
                warn!("Remote call {} exceeded {:?}", name, limit);
                Err(SessionError::Timeout {
                    call: name.to_string(),
                    timeout: limit,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(SessionError::RemoteExecution(format!(
                "remote call {} exited without a reply",
                name
            ))),
        }
    }

    /// [`Self::call`] with remote failures folded into [`SessionError`]
    pub(crate) fn call_flat<T, F>(&self, name: &str, f: F) -> SessionResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    {
        self.call(name, f)?.map_err(SessionError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_call_without_deadline_runs_inline() {
        let remote = RemoteCaller::new(None, 1).unwrap();
        let caller = thread::current().id();
        let reply = remote
            .call("inline", move || Ok(thread::current().id() == caller))
            .unwrap();
        assert_eq!(reply, Ok(true));
    }

    #[test]
    fn test_call_times_out() {
        let remote = RemoteCaller::new(Some(Duration::from_millis(20)), 1).unwrap();
        let result = remote.call("slow", || {
            thread::sleep(Duration::from_millis(500));
            Ok(())
        });
        assert!(matches!(result, Err(SessionError::Timeout { .. })));
    }

    #[test]
    fn test_abandoned_calls_stay_within_the_pool() {
        let remote = RemoteCaller::new(Some(Duration::from_millis(50)), 2).unwrap();
        let release = Arc::new(Barrier::new(3));
        for _ in 0..2 {
            let release = release.clone();
            let result = remote.call("hung", move || {
                release.wait();
                Ok(())
            });
            assert!(matches!(result, Err(SessionError::Timeout { .. })));
        }

        // both threads are held, so the next call waits its turn and times out
        let queued = remote.call("queued", || Ok(1));
        assert!(matches!(queued, Err(SessionError::Timeout { .. })));

        release.wait();
        let mut reply = None;
        for _ in 0..20 {
            if let Ok(answer) = remote.call("after", || Ok(2)) {
                reply = Some(answer);
                break;
            }
        }
        assert_eq!(reply, Some(Ok(2)));
    }

    #[test]
    fn test_remote_error_passes_through() {
        let remote = RemoteCaller::new(Some(Duration::from_secs(5)), 1).unwrap();
        let reply = remote
            .call::<(), _>("fails", || Err(RemoteError::AlreadyExists("x".into())))
            .unwrap();
        assert_eq!(reply, Err(RemoteError::AlreadyExists("x".into())));

        let flat = remote.call_flat::<(), _>("fails", || Err(RemoteError::Failed("boom".into())));
        assert!(matches!(flat, Err(SessionError::RemoteExecution(m)) if m == "boom"));
    }
}
