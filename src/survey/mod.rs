//! Survey abstraction layer.
//!
//! A survey is one sky map: a tree of tiles on a server (and possibly
//! mirrors), with a wire format, a display cut range, and a cache
//! directory. The load pipeline consumes surveys through the
//! [`SurveyContext`] trait; [`Survey`] is the concrete implementation
//! configured from a [`SurveyConfig`] description.

mod context;
#[allow(clippy::module_inception)]
mod survey;

pub use context::{CountersSnapshot, LoadCounters, SurveyContext};
pub use survey::{RepaintFn, Survey, SurveyConfig};
