use std::sync::{Arc, Mutex};

/// One-shot, idempotent release capability.
///
/// `dispose` is safe to call any number of times; the underlying side effect
/// runs at most once. Whoever holds the last reference is responsible for
/// disposing during teardown.
pub trait Dispose {
    fn dispose(&self);
    fn is_disposed(&self) -> bool;
}

/// Shared handle to a release action that runs at most once.
///
/// Clones share disposal state, so any clone may be used to cancel and all of
/// them observe `is_disposed` flipping together. Release actions run with no
/// lock held, so an action may freely re-enter the disposable family.
#[derive(Clone)]
pub struct Disposable {
    inner: Arc<Mutex<Option<Box<dyn FnOnce() + Send>>>>,
}

impl Disposable {
    pub fn new(action: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Some(Box::new(action)))),
        }
    }

    /// A handle with no release action; reads as already disposed.
    pub fn empty() -> Self {
        Self {
            inner: Arc::new(Mutex::new(None)),
        }
    }

    fn same_handle(&self, other: &Disposable) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Dispose for Disposable {
    fn dispose(&self) {
        let action = self.inner.lock().unwrap().take();
        if let Some(action) = action {
            action();
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.lock().unwrap().is_none()
    }
}

/// Container owning at most one live inner disposable.
///
/// Setting a replacement disposes the previous inner handle; setting after
/// the serial itself was disposed releases the incoming handle immediately,
/// so a caller can atomically swap "waiting on a timer" for "subscribed"
/// without ever holding two live resources or leaking one.
#[derive(Clone, Default)]
pub struct SerialDisposable {
    inner: Arc<Mutex<SerialState>>,
}

#[derive(Default)]
struct SerialState {
    disposed: bool,
    current: Option<Disposable>,
}

impl SerialDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, disposable: Disposable) {
        let stale = {
            let mut state = self.inner.lock().unwrap();
            if state.disposed {
                Some(disposable)
            } else {
                state.current.replace(disposable)
            }
        };
        if let Some(stale) = stale {
            stale.dispose();
        }
    }

    /// Clone of the currently held inner handle, if any.
    pub fn current(&self) -> Option<Disposable> {
        self.inner.lock().unwrap().current.clone()
    }
}

impl Dispose for SerialDisposable {
    fn dispose(&self) {
        let current = {
            let mut state = self.inner.lock().unwrap();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.current.take()
        };
        if let Some(current) = current {
            current.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.lock().unwrap().disposed
    }
}

impl From<SerialDisposable> for Disposable {
    fn from(serial: SerialDisposable) -> Disposable {
        Disposable::new(move || serial.dispose())
    }
}

/// Container owning a set of disposables torn down together.
#[derive(Clone, Default)]
pub struct CompositeDisposable {
    inner: Arc<Mutex<CompositeState>>,
}

#[derive(Default)]
struct CompositeState {
    disposed: bool,
    members: Vec<Disposable>,
}

impl CompositeDisposable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member; if the composite is already disposed the handle is
    /// released immediately instead of being retained.
    pub fn add(&self, disposable: Disposable) {
        let reject = {
            let mut state = self.inner.lock().unwrap();
            if state.disposed {
                Some(disposable)
            } else {
                state.members.push(disposable);
                None
            }
        };
        if let Some(reject) = reject {
            reject.dispose();
        }
    }

    /// Disposes `disposable` and detaches it from the set. Returns false when
    /// it was not a member.
    pub fn remove(&self, disposable: &Disposable) -> bool {
        let found = {
            let mut state = self.inner.lock().unwrap();
            state
                .members
                .iter()
                .position(|member| member.same_handle(disposable))
                .map(|index| state.members.swap_remove(index))
        };
        match found {
            Some(member) => {
                member.dispose();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().members.is_empty()
    }
}

impl Dispose for CompositeDisposable {
    fn dispose(&self) {
        let members = {
            let mut state = self.inner.lock().unwrap();
            if state.disposed {
                return;
            }
            state.disposed = true;
            std::mem::take(&mut state.members)
        };
        for member in members {
            member.dispose();
        }
    }

    fn is_disposed(&self) -> bool {
        self.inner.lock().unwrap().disposed
    }
}

impl From<CompositeDisposable> for Disposable {
    fn from(composite: CompositeDisposable) -> Disposable {
        Disposable::new(move || composite.dispose())
    }
}
