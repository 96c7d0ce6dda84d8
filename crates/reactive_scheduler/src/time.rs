use std::fmt;
use std::ops::Add;
use std::time::Duration;

/// Logical instant measured from a scheduler's epoch.
///
/// Both scheduler implementations read time as "elapsed since my epoch": the
/// real-time scheduler anchors the epoch to an `Instant` captured at
/// construction, while virtual schedulers treat it as a purely logical value
/// advanced by the caller.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(Duration);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(Duration::ZERO);

    pub fn new(since_epoch: Duration) -> Self {
        Timestamp(since_epoch)
    }

    pub fn from_millis(millis: u64) -> Self {
        Timestamp(Duration::from_millis(millis))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    /// Span from `earlier` to `self`, zero if `earlier` is actually later.
    pub fn saturating_since(self, earlier: Timestamp) -> Duration {
        self.0.saturating_sub(earlier.0)
    }
}

impl Add<Duration> for Timestamp {
    type Output = Timestamp;

    fn add(self, rhs: Duration) -> Timestamp {
        Timestamp(self.0 + rhs)
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t+{:?}", self.0)
    }
}

/// Time axis a virtual scheduler can run on.
///
/// Absolute values order the event queue; `advance` folds a relative span
/// into an absolute value. A custom ordering is expressed as a custom time
/// type. Spans may be signed, which is why advancing is allowed to fail the
/// monotonicity check at the call site rather than here.
pub trait VirtualTime: Copy + Ord + Send + fmt::Debug + 'static {
    type Span: Copy + Send + fmt::Debug + 'static;

    fn advance(self, span: Self::Span) -> Self;
}

impl VirtualTime for Timestamp {
    type Span = Duration;

    fn advance(self, span: Duration) -> Self {
        self + span
    }
}
