//! # Room Client Library
//!
//! Viewer side of the physics sync layer. The client never simulates: it
//! receives authoritative snapshots from its room and shows them smoothly.
//!
//! ## Data Flow
//!
//! 1. The network thread ([`network`]) decodes frames and queues them.
//! 2. Between frames the session ([`game`]) drains the queue and hands each
//!    `PhysicsState` to the [`reconciler::Reconciler`].
//! 3. The reconciler keeps the last snapshot by object id and derives from it
//!    both the visual proxies (through a [`scene::Scene`]) and the
//!    [`shadow::ShadowWorld`] used by the wireframe overlay.
//! 4. Every frame proxies are blended toward their targets, then
//!    [`rendering`] draws the scene.
//!
//! ## Interpolation
//!
//! New objects appear exactly where the server put them. Afterwards only the
//! target moves, and the rendered transform follows it with a blend factor
//! derived from the frame time, so convergence speed is the same at any
//! frame rate.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::game::ClientSession;
//! use client::network::NetworkHandle;
//! use client::rendering::MacroquadScene;
//!
//! let network = NetworkHandle::spawn("127.0.0.1:8080".to_string()).unwrap();
//! let mut session = ClientSession::new(MacroquadScene::new(), None);
//!
//! // Once per frame:
//! for event in network.poll() {
//!     for packet in session.handle_event(event) {
//!         network.send(packet);
//!     }
//! }
//! session.interpolate(1.0 / 60.0);
//! ```

pub mod game;
pub mod input;
pub mod network;
pub mod reconciler;
pub mod rendering;
pub mod scene;
pub mod shadow;
