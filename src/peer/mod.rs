pub mod download;
pub mod selection;
pub mod serve;
pub mod upload;

pub use download::download_file;
pub use selection::choose_peer;
pub use serve::{run_seed, SeedNode};
pub use upload::upload_file;
