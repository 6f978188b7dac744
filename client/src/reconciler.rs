//! Client reconciler: turns server snapshots into visual proxies and shadow
//! bodies, and smooths proxies toward their latest targets every frame.
//!
//! The last accepted snapshot is kept by object id. After each `reconcile`
//! both the proxy set and the shadow world are derived from that one store, so
//! they can never disagree about which objects exist.

use log::{debug, warn};
use shared::{ObjectId, ObjectState, Shape};
use std::collections::{BTreeMap, HashMap};

use crate::scene::{Scene, Transform};
use crate::shadow::ShadowWorld;

/// Per-frame blend rates at the 60 Hz reference frame rate.
pub const POSITION_LERP_RATE: f32 = 0.15;
pub const ROTATION_LERP_RATE: f32 = 0.25;
const REFERENCE_FPS: f32 = 60.0;

/// Frames between proxy trace lines.
const TRACE_INTERVAL_FRAMES: u64 = 180;

/// Converts a per-reference-frame blend rate into the factor for a frame of
/// length `dt`, so convergence speed does not depend on the frame rate.
pub fn blend_factor(rate: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        return 0.0;
    }
    1.0 - (1.0 - rate.clamp(0.0, 1.0)).powf(dt * REFERENCE_FPS)
}

struct Proxy<V> {
    visual: V,
    shape: Shape,
    /// What is on screen now.
    rendered: Transform,
    /// Latest server-reported transform.
    target: Transform,
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    pub skipped: usize,
}

/// Keeps one proxy and one shadow body per object in the latest snapshot.
pub struct Reconciler<S: Scene> {
    scene: S,
    /// Last received record per object, ordered by id.
    store: BTreeMap<ObjectId, ObjectState>,
    proxies: HashMap<ObjectId, Proxy<S::Visual>>,
    shadow: ShadowWorld,
    frames: u64,
}

impl<S: Scene> Reconciler<S> {
    pub fn new(scene: S) -> Self {
        Self {
            scene,
            store: BTreeMap::new(),
            proxies: HashMap::new(),
            shadow: ShadowWorld::new(),
            frames: 0,
        }
    }

    /// Applies one snapshot. Records with unusable shapes are logged and
    /// skipped; the rest of the pass still runs.
    pub fn reconcile(&mut self, objects: &[ObjectState]) -> ReconcileStats {
        let mut stats = ReconcileStats::default();

        self.store.clear();
        for state in objects {
            if let Err(e) = state.shape.validate() {
                warn!("Skipping object {}: {}", state.id, e);
                stats.skipped += 1;
                continue;
            }
            self.store.insert(state.id, *state);
        }

        let stale: Vec<ObjectId> = self
            .proxies
            .iter()
            .filter(|(id, proxy)| {
                self.store
                    .get(id)
                    .map_or(true, |state| state.shape != proxy.shape)
            })
            .map(|(id, _)| *id)
            .collect();
        for id in stale {
            if let Some(proxy) = self.proxies.remove(&id) {
                self.scene.remove_visual(proxy.visual);
                stats.removed += 1;
            }
        }

        for (id, state) in &self.store {
            let target = Transform::from(state);
            match self.proxies.get_mut(id) {
                Some(proxy) => {
                    proxy.target = target;
                    stats.updated += 1;
                }
                None => {
                    let visual = self.scene.add_visual(*id, &state.shape, &target);
                    self.proxies.insert(
                        *id,
                        Proxy {
                            visual,
                            shape: state.shape,
                            rendered: target,
                            target,
                        },
                    );
                    stats.created += 1;
                }
            }
        }

        self.shadow.sync(&self.store);

        if stats.created > 0 || stats.removed > 0 {
            debug!(
                "Reconciled {} objects: {} created, {} removed",
                self.store.len(),
                stats.created,
                stats.removed
            );
        }
        stats
    }

    /// Moves every proxy toward its target for a frame of `dt` seconds.
    pub fn interpolate(&mut self, dt: f32) {
        let position_t = blend_factor(POSITION_LERP_RATE, dt);
        let rotation_t = blend_factor(ROTATION_LERP_RATE, dt);
        self.frames += 1;
        let trace = self.frames % TRACE_INTERVAL_FRAMES == 0;

        for (id, proxy) in self.proxies.iter_mut() {
            proxy.rendered = proxy
                .rendered
                .blend_toward(&proxy.target, position_t, rotation_t);
            self.scene.set_transform(&mut proxy.visual, &proxy.rendered);

            if trace {
                debug!(
                    "Object {} - target y: {:.2}, rendered y: {:.2}",
                    id, proxy.target.position.y, proxy.rendered.position.y
                );
            }
        }
    }

    /// Releases every proxy and shadow body.
    pub fn clear(&mut self) {
        for (_, proxy) in self.proxies.drain() {
            self.scene.remove_visual(proxy.visual);
        }
        self.store.clear();
        self.shadow.clear();
    }

    /// Tracked ids in ascending order.
    pub fn ids(&self) -> Vec<ObjectId> {
        self.store.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn rendered(&self, id: ObjectId) -> Option<Transform> {
        self.proxies.get(&id).map(|proxy| proxy.rendered)
    }

    pub fn target(&self, id: ObjectId) -> Option<Transform> {
        self.proxies.get(&id).map(|proxy| proxy.target)
    }

    pub fn shape(&self, id: ObjectId) -> Option<Shape> {
        self.store.get(&id).map(|state| state.shape)
    }

    pub fn shadow(&self) -> &ShadowWorld {
        &self.shadow
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }
}

impl<S: Scene> Drop for Reconciler<S> {
    fn drop(&mut self) {
        self.clear();
    }
}
