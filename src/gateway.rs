//! Protocol translation gateway: services that front a backing container and
//! rewrite the emulated cloud API into the engine's native one.

mod binding;
mod proxy;
mod storage;
mod translator;

pub use binding::ContainerBinding;
pub use proxy::ReverseProxy;
pub use storage::StorageService;
pub use translator::{PathRewritten, StorageTranslator, scrub_headers, translate_path};
