//! Cancellable scheduled events
//!
//! A timer is a due time plus a payload. Scheduling returns a token; the
//! owner of whatever the timer refers to keeps the token and cancels it when
//! that thing goes away, so a fired timer never acts on a stale target.

/// Cancellation token for a scheduled event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerToken(u64);

#[derive(Debug, Clone)]
struct Timer<E> {
    token: TimerToken,
    due_ms: f64,
    event: E,
}

/// Queue of pending events, fired in due-time order
#[derive(Debug, Clone)]
pub struct TimerQueue<E> {
    timers: Vec<Timer<E>>,
    next_token: u64,
}

impl<E> Default for TimerQueue<E> {
    fn default() -> Self {
        Self {
            timers: Vec::new(),
            next_token: 1,
        }
    }
}

impl<E> TimerQueue<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, due_ms: f64, event: E) -> TimerToken {
        let token = TimerToken(self.next_token);
        self.next_token += 1;
        self.timers.push(Timer {
            token,
            due_ms,
            event,
        });
        token
    }

    /// Cancel a pending event. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.token != token);
        self.timers.len() != before
    }

    pub fn is_pending(&self, token: TimerToken) -> bool {
        self.timers.iter().any(|t| t.token == token)
    }

    /// Remove and return every event due at or before `now_ms`.
    /// Ordered by due time, ties by scheduling order.
    pub fn drain_due(&mut self, now_ms: f64) -> Vec<(TimerToken, E)> {
        let (mut due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.timers)
            .into_iter()
            .partition(|t| t.due_ms <= now_ms);
        self.timers = pending;
        due.sort_by(|a, b| a.due_ms.total_cmp(&b.due_ms).then(a.token.cmp(&b.token)));
        due.into_iter().map(|t| (t.token, t.event)).collect()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}
