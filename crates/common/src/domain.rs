mod collaborators;
mod envelope;
mod reading;
mod reading_codec;
mod result;

pub use collaborators::*;
pub use envelope::*;
pub use reading::*;
pub use reading_codec::*;
pub use result::*;
