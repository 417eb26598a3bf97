//! Service descriptors, bundles and factories

mod bundle;
mod descriptor;
mod error;
mod factory;
mod placeholder;
mod registry;

pub use bundle::*;
pub use descriptor::*;
pub use error::*;
pub use factory::*;
pub use placeholder::*;
pub use registry::*;
