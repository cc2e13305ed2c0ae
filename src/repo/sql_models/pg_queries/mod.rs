mod documents;
pub use documents::*;

mod indexes;
pub use indexes::*;
