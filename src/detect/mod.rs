mod backend;
mod backends;
mod result;
mod style;

pub use backend::{Detector, DetectorError};
pub use backends::StubDetector;
pub use result::Detection;
pub use style::{ClassStyle, StyleMap};
