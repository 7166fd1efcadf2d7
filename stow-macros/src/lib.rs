// lib.rs - Root of macro crate
use proc_macro::TokenStream;

mod trackable;

/// Implements `stow::Trackable` for a struct with named fields.
///
/// - `#[track]` exposes a field as a persisted property named after it.
/// - `#[track(id)]` uses the field's `Display` output as the tracking id.
/// - `#[track(expose)]` makes a field readable and writable by name without persisting it
///   by default, for properties an initializer or `TrackingAware` impl opts into.
/// - `#[track(parent)]` embeds the parent type; lineage and properties delegate to it.
/// - `#[trackable(aware)]` on the struct hands the configuration to its `TrackingAware` impl.
#[proc_macro_derive(Trackable, attributes(track, trackable))]
pub fn derive_trackable(input: TokenStream) -> TokenStream {
    trackable::derive_trackable_impl(input)
}
