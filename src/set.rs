//! A set of anchors, addressed by handles.

use crate::anchor::{Anchor, CouplingMode};
use crate::error::AnchorError;
use crate::math::{Point, Real};
use crate::rod::{Rod, RodElementHandle};
use rapier::dynamics::{RigidBodyHandle, RigidBodySet};

/// Handle of an anchor stored in an [`AnchorSet`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde-serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct AnchorHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
struct AnchorEntry {
    body: RigidBodyHandle,
    element: RodElementHandle,
    orientation: RodElementHandle,
    anchor: Anchor,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<AnchorEntry>,
}

/// Every anchor binding a [`Rod`] to the rigid-bodies of a [`RigidBodySet`].
///
/// Neither the rigid-bodies nor the rod elements are owned by the set: it only keeps their
/// handles and borrows the containers whenever it needs them. Every call must be given the
/// same [`Rod`]: the set does not record which rod its element handles index into, and
/// removing anchors against another rod clears the flags of that rod's nodes instead.
///
/// Like [`Anchor`], the set cannot be cloned, so a live anchor is never duplicated.
#[derive(Debug, Default)]
pub struct AnchorSet {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl AnchorSet {
    /// Creates an empty set of anchors.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live anchors.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Is this set empty?
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Anchors the rod node `element` to the rigid-body `body` at the world-space point
    /// `world_point`.
    ///
    /// `orientation` is the orientation element of the rod segment the node belongs to. Fails
    /// with [`AnchorError::InvalidArgument`] if any handle doesn't resolve, and with
    /// [`AnchorError::NodeAlreadyAnchored`] if the node is already held by another anchor.
    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
        bodies: &RigidBodySet,
        rod: &mut Rod,
        body: RigidBodyHandle,
        element: RodElementHandle,
        orientation: RodElementHandle,
        world_point: Point<Real>,
        mode: CouplingMode,
    ) -> Result<AnchorHandle, AnchorError> {
        let rb = bodies
            .get(body)
            .ok_or(AnchorError::InvalidArgument("unknown rigid-body"))?;
        if rod.orientation(orientation).is_none() {
            return Err(AnchorError::InvalidArgument("unknown rod orientation element"));
        }
        let node = rod
            .position_mut(element)
            .ok_or(AnchorError::InvalidArgument("unknown rod position element"))?;

        let anchor = Anchor::attach(rb, node, world_point, mode)?;
        let entry = AnchorEntry {
            body,
            element,
            orientation,
            anchor,
        };

        let handle = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                AnchorHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                });
                AnchorHandle {
                    index: self.slots.len() as u32 - 1,
                    generation: 0,
                }
            }
        };
        self.len += 1;

        tracing::debug!(?handle, ?body, ?element, "anchor inserted");
        Ok(handle)
    }

    /// Releases the anchor `handle`, clearing the anchored flag of its rod node.
    ///
    /// `rod` must be the rod given to [`AnchorSet::insert`].
    pub fn remove(&mut self, handle: AnchorHandle, rod: &mut Rod) -> Result<(), AnchorError> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.entry.is_some())
            .ok_or(AnchorError::UnknownAnchor(handle))?;
        let entry = slot.entry.take().ok_or(AnchorError::UnknownAnchor(handle))?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;

        release_entry(handle, entry, rod);
        Ok(())
    }

    /// Releases every anchor, typically when the simulation is reset.
    ///
    /// `rod` must be the rod given to [`AnchorSet::insert`].
    pub fn clear(&mut self, rod: &mut Rod) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if let Some(entry) = slot.entry.take() {
                let handle = AnchorHandle {
                    index: index as u32,
                    generation: slot.generation,
                };
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
                release_entry(handle, entry, rod);
            }
        }

        tracing::debug!(released = self.len, "anchor set cleared");
        self.len = 0;
    }

    /// Solves every anchor for a step of length `dt`.
    ///
    /// All the handles are checked before anything is applied, so a failing step leaves the
    /// rigid-bodies and the rod untouched. Anchors sharing a rigid-body apply their impulses
    /// one after the other, in no particular order.
    pub fn step(
        &self,
        dt: Real,
        bodies: &mut RigidBodySet,
        rod: &mut Rod,
    ) -> Result<(), AnchorError> {
        if !(dt > 0.0) {
            return Err(AnchorError::NonPositiveTimestep(dt));
        }

        for (handle, entry) in self.entries() {
            if !bodies.contains(entry.body) {
                tracing::warn!(?handle, body = ?entry.body, "anchored rigid-body is gone");
                return Err(AnchorError::MissingBody(handle));
            }
            if rod.position(entry.element).is_none() {
                tracing::warn!(?handle, element = ?entry.element, "anchored rod element is gone");
                return Err(AnchorError::MissingElement(handle));
            }
        }

        for (handle, entry) in self.entries() {
            let rb = bodies
                .get_mut(entry.body)
                .ok_or(AnchorError::MissingBody(handle))?;
            let node = rod
                .position_mut(entry.element)
                .ok_or(AnchorError::MissingElement(handle))?;
            entry.anchor.solve(rb, node, dt)?;
        }

        Ok(())
    }

    /// The anchor with the given handle.
    pub fn get(&self, handle: AnchorHandle) -> Option<&Anchor> {
        self.entry(handle).map(|entry| &entry.anchor)
    }

    /// The rigid-body the anchor `handle` is attached to.
    pub fn body(&self, handle: AnchorHandle) -> Option<RigidBodyHandle> {
        self.entry(handle).map(|entry| entry.body)
    }

    /// The rod position element the anchor `handle` holds.
    pub fn element(&self, handle: AnchorHandle) -> Option<RodElementHandle> {
        self.entry(handle).map(|entry| entry.element)
    }

    /// The rod orientation element of the segment held by the anchor `handle`.
    pub fn orientation(&self, handle: AnchorHandle) -> Option<RodElementHandle> {
        self.entry(handle).map(|entry| entry.orientation)
    }

    /// The current world-space position of the anchor `handle`.
    pub fn world_position(
        &self,
        handle: AnchorHandle,
        bodies: &RigidBodySet,
    ) -> Option<Point<Real>> {
        let entry = self.entry(handle)?;
        let rb = bodies.get(entry.body)?;
        Some(entry.anchor.world_position(rb))
    }

    /// Iterates through every live anchor.
    pub fn iter(&self) -> impl Iterator<Item = (AnchorHandle, &Anchor)> {
        self.entries().map(|(handle, entry)| (handle, &entry.anchor))
    }

    fn entry(&self, handle: AnchorHandle) -> Option<&AnchorEntry> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)?
            .entry
            .as_ref()
    }

    fn entries(&self) -> impl Iterator<Item = (AnchorHandle, &AnchorEntry)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            let handle = AnchorHandle {
                index: index as u32,
                generation: slot.generation,
            };
            slot.entry.as_ref().map(|entry| (handle, entry))
        })
    }
}

fn release_entry(handle: AnchorHandle, entry: AnchorEntry, rod: &mut Rod) {
    match rod.position_mut(entry.element) {
        Some(node) => {
            if !node.is_anchor {
                // Only happens when given a rod other than the one the anchor was inserted in.
                tracing::warn!(
                    ?handle,
                    element = ?entry.element,
                    "released node was not anchored"
                );
            }
            entry.anchor.release(node)
        }
        None => {
            // The element is gone, there is no flag left to clear.
            tracing::warn!(?handle, element = ?entry.element, "released anchor had no rod element");
        }
    }
}
