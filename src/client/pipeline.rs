//! Bounded windows of outstanding requests.

use std::collections::VecDeque;

use super::{
    error::{Error, SftpResult},
    rawsession::RawSftpSession,
    transport::Transport,
};
use crate::protocol::{Request, Response};

/// Requests sent but not yet drained, each tagged with a caller key (a
/// file offset, a path...) that comes back with its response.
pub struct Batch<K> {
    window: usize,
    submitted: VecDeque<(u32, K)>,
}

impl<K> Batch<K> {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            submitted: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.submitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.submitted.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.submitted.len() >= self.window
    }

    /// Sends the request built from a fresh id. Nothing is read here.
    pub async fn submit<T, F>(
        &mut self,
        session: &mut RawSftpSession<T>,
        key: K,
        build: F,
    ) -> SftpResult<()>
    where
        T: Transport,
        F: FnOnce(u32) -> Request,
    {
        let id = session.use_next_id();
        let id = session.send(build(id)).await?;
        self.submitted.push_back((id, key));
        Ok(())
    }

    /// Collects the response of every submitted request, in submission
    /// order whatever order they arrived in. A status error only affects
    /// its own slot; once the channel breaks every remaining slot carries
    /// that error.
    pub async fn drain<T: Transport>(
        &mut self,
        session: &mut RawSftpSession<T>,
    ) -> Vec<(K, SftpResult<Response>)> {
        let mut results = Vec::with_capacity(self.submitted.len());
        let mut broken: Option<Error> = None;

        while let Some((id, key)) = self.submitted.pop_front() {
            if let Some(error) = &broken {
                results.push((key, Err(error.clone())));
                continue;
            }

            let result = session.receive(id).await;
            if let Err(error) = &result {
                if error.is_transport() {
                    broken = Some(error.clone());
                }
            }

            results.push((key, result));
        }

        results
    }
}

/// Tally of a best-effort operation over many entries.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub total: usize,
    pub failed: usize,
    pub first: Option<Error>,
}

impl BatchOutcome {
    pub fn record<T>(&mut self, result: SftpResult<T>) {
        self.total += 1;
        if let Err(error) = result {
            if self.first.is_none() {
                self.first = Some(error);
            }
            self.failed += 1;
        }
    }

    pub fn into_result(self) -> SftpResult<()> {
        match self.first {
            None => Ok(()),
            Some(first) => Err(Error::Batch {
                failed: self.failed,
                total: self.total,
                first: Box::new(first),
            }),
        }
    }
}
