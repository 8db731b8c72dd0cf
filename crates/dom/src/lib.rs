#![allow(
    clippy::missing_docs_in_private_items,
    reason = "Internal implementation details don't need public documentation"
)]
#![allow(
    clippy::missing_inline_in_public_items,
    reason = "Inlining decisions left to compiler for this crate"
)]
//! The virtual document.
//!
//! A [`Document`] owns an arena of nodes addressed by stable [`NodeKey`]s.
//! Every mutation of a connected node is recorded as a patch at the moment it
//! happens; [`Document::flush`] hands the accumulated operations out as one
//! [`PatchBatch`]. Synthetic events, mutation observers and hydration all sit
//! on top of the same tree.

pub mod capabilities;
pub mod document;
pub mod error;
pub mod events;
pub mod hydrate;
pub mod node;
pub mod observer;
pub mod patch;
pub mod style;

pub use bridge::{InboundEvent, NodeKey, PatchBatch};
pub use capabilities::default_registry;
pub use document::{Document, DocumentOptions};
pub use error::{DomError, HydrationError, TreeError};
pub use events::{DispatchOutcome, EventPhase, ListenerOptions, SyntheticEvent};
pub use hydrate::{ComponentRenderer, HydrationReport, HydrationTicket, Hydrator, Template};
pub use node::{AttrValue, DOMNode, ElementData, EventHandler, HandlerId, NodeKind};
pub use observer::{MutationKind, MutationObserverInit, MutationRecord, ObserverId};
pub use patch::PatchCounters;
pub use style::Style;
