mod conv;
mod res_conv;

pub use conv::*;
pub use res_conv::*;
