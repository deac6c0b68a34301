//! Business logic services.
//!
//! Services orchestrate the template store, the extractor and the artifact
//! store behind the request/response operations front-ends call.

mod recognition;

pub use recognition::RecognitionService;
