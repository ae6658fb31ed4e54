use rapier3d::prelude::*;

/// Object layer a body lives on for its whole lifetime
///
/// The set is closed: static scenery and everything that moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ObjectLayer {
    /// Non-moving scenery
    Static = 0,

    /// Simulated bodies
    Dynamic = 1,
}

/// Broad-phase bucket an object layer is sorted into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BroadPhaseLayer {
    NonMoving = 0,
    Moving = 1,
}

/// Object layer -> broad-phase layer, indexed by `ObjectLayer as usize`
const BROAD_PHASE_TABLE: [BroadPhaseLayer; ObjectLayer::COUNT] =
    [BroadPhaseLayer::NonMoving, BroadPhaseLayer::Moving];

impl ObjectLayer {
    pub const COUNT: usize = 2;

    pub const ALL: [ObjectLayer; ObjectLayer::COUNT] = [ObjectLayer::Static, ObjectLayer::Dynamic];

    /// Decode a raw layer id coming across a flat interface
    ///
    /// # Panics
    /// Any value outside the fixed layer set is a contract violation.
    pub fn from_raw(raw: u16) -> Self {
        match raw {
            0 => ObjectLayer::Static,
            1 => ObjectLayer::Dynamic,
            other => super::contract_violation!("unknown object layer {}", other),
        }
    }

    pub fn as_raw(self) -> u16 {
        self as u16
    }

    fn group(self) -> Group {
        Group::from_bits_truncate(1 << (self as u32))
    }

    /// Lower the layer rules into rapier interaction groups
    ///
    /// Membership is the layer's own bit; the filter is every layer the predicate
    /// table says this one may collide with, so the kernel's pair test and
    /// [`may_collide_objects`] always agree.
    pub fn interaction_groups(self) -> InteractionGroups {
        let filter = ObjectLayer::ALL
            .iter()
            .filter(|other| may_collide_objects(self, **other))
            .fold(Group::empty(), |acc, other| acc | other.group());

        InteractionGroups::new(self.group(), filter)
    }
}

/// Map an object layer to its broad-phase layer
pub fn classify(layer: ObjectLayer) -> BroadPhaseLayer {
    BROAD_PHASE_TABLE[layer as usize]
}

/// Object-vs-object rule: static scenery never collides with itself
pub fn may_collide_objects(a: ObjectLayer, b: ObjectLayer) -> bool {
    !matches!((a, b), (ObjectLayer::Static, ObjectLayer::Static))
}

/// Object-vs-broad-phase rule, consulted before any object pair is considered
pub fn may_collide_broadphase(layer: ObjectLayer, broad_phase: BroadPhaseLayer) -> bool {
    match layer {
        ObjectLayer::Static => broad_phase == BroadPhaseLayer::Moving,
        ObjectLayer::Dynamic => true,
    }
}
