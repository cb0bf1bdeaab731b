//! Per-volume event sink, replacing a process-wide notification stream and
//! verbosity flag with something that composes in a library. Host
//! applications inject their own [`Observer`]; the default forwards to the
//! `log` crate, the same pattern `moses-core`'s formatters use
//! (`log::info!`/`debug!` rather than printing to a fixed stream).

use crate::guid::Guid;

/// Diagnostic/progress events a [`crate::Volume`] can report during catalog
/// scanning and store metadata loading.
pub enum Event<'a> {
    /// The catalog scan reached another catalog block.
    CatalogBlock { offset: u64 },
    /// A store was found in the catalog and added to the volume's list.
    StoreDiscovered { index: usize, id: Guid },
    /// A store's metadata chain finished loading.
    StoreLoaded { index: usize, block_count: usize },
    /// A store's metadata failed to load; the store is now unavailable but
    /// the volume itself remains usable.
    StoreLoadFailed { index: usize, message: &'a str },
}

pub trait Observer: Send + Sync {
    fn on_event(&self, event: Event<'_>);
}

/// The default observer: forwards every event to the `log` crate at an
/// appropriate level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn on_event(&self, event: Event<'_>) {
        match event {
            Event::CatalogBlock { offset } => {
                log::trace!("vss: catalog block at {:#x}", offset)
            }
            Event::StoreDiscovered { index, id } => {
                log::debug!("vss: discovered store {} ({})", index, id)
            }
            Event::StoreLoaded { index, block_count } => {
                log::debug!(
                    "vss: store {} metadata loaded ({} blocks)",
                    index,
                    block_count
                )
            }
            Event::StoreLoadFailed { index, message } => {
                log::warn!("vss: store {} failed to load: {}", index, message)
            }
        }
    }
}
