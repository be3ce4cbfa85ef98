//! Analysis callback endpoints.
//!
//! An endpoint is an externally supplied function invoked at one dispatch
//! phase. Every endpoint is optional: an absent endpoint means "do not
//! dispatch, do not error", and handlers must not even build the argument
//! list for it.

use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use evtap_core::{AnalysisError, LocationId, Value};
use evtap_dispatch::HandlerResult;

/// Named arguments passed to one callback invocation, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackArgs {
    pub callback: &'static str,
    pub iid: LocationId,
    args: SmallVec<[(&'static str, Value); 8]>,
}

impl CallbackArgs {
    pub fn new(callback: &'static str, iid: LocationId) -> Self {
        CallbackArgs {
            callback,
            iid,
            args: SmallVec::new(),
        }
    }

    pub fn with(mut self, name: &'static str, value: Value) -> Self {
        self.args.push((name, value));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.args.iter().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.args.iter().map(|(n, v)| (*n, v))
    }
}

impl fmt::Display for CallbackArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(iid={}", self.callback, self.iid)?;
        for (name, value) in self.iter() {
            write!(f, ", {}={}", name, value)?;
        }
        write!(f, ")")
    }
}

/// An analysis callback. A returned value asks for a substitution.
pub type Callback = Rc<dyn Fn(&CallbackArgs) -> Result<Option<Value>, AnalysisError>>;

/// Wraps a closure as a [`Callback`].
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&CallbackArgs) -> Result<Option<Value>, AnalysisError> + 'static,
{
    Rc::new(f)
}

/// The endpoint set one factory binds its handlers to.
#[derive(Clone, Default)]
pub struct Endpoints {
    pub pre: Option<Callback>,
    pub post: Option<Callback>,
    pub on_input: Option<Callback>,
    pub on_exception: Option<Callback>,
    pub enter: Option<Callback>,
}

impl fmt::Debug for Endpoints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoints")
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .field("on_input", &self.on_input.is_some())
            .field("on_exception", &self.on_exception.is_some())
            .field("enter", &self.enter.is_some())
            .finish()
    }
}

impl Endpoints {
    pub fn new() -> Self {
        Endpoints::default()
    }

    pub fn pre(mut self, cb: Callback) -> Self {
        self.pre = Some(cb);
        self
    }

    pub fn post(mut self, cb: Callback) -> Self {
        self.post = Some(cb);
        self
    }

    pub fn on_input(mut self, cb: Callback) -> Self {
        self.on_input = Some(cb);
        self
    }

    pub fn on_exception(mut self, cb: Callback) -> Self {
        self.on_exception = Some(cb);
        self
    }

    pub fn enter(mut self, cb: Callback) -> Self {
        self.enter = Some(cb);
        self
    }

    /// True when no phase has an endpoint.
    pub fn is_empty(&self) -> bool {
        self.pre.is_none()
            && self.post.is_none()
            && self.on_input.is_none()
            && self.on_exception.is_none()
            && self.enter.is_none()
    }
}

/// Invokes `endpoint` with lazily built arguments, or does nothing.
pub(crate) fn dispatch<F>(endpoint: &Option<Callback>, args: F) -> HandlerResult
where
    F: FnOnce() -> CallbackArgs,
{
    match endpoint {
        Some(cb) => cb(&args()),
        None => Ok(None),
    }
}

/// Like [`dispatch`], discarding any returned value.
pub(crate) fn notify<F>(endpoint: &Option<Callback>, args: F) -> Result<(), AnalysisError>
where
    F: FnOnce() -> CallbackArgs,
{
    dispatch(endpoint, args).map(|_| ())
}
