//! Detected events and their wire-level numeric codes.
//!
//! Codes match the CAN `EVENT` typed frame's `event_type` byte, so an
//! [`Event`] produced here can be forwarded to a LED/scheduler consumer or
//! encoded straight back onto the bus without translation.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EventKind {
    SectorActivated = 1,
    SectorChanged = 2,
    IntensityChange = 3,
    SectionDeactivated = 4,
    SessionStarted = 5,
    SessionEnded = 6,
    PassingSectorChange = 7,
    PossibleMechanicalFailure = 8,
    ErrorNoData = 9,
}

impl EventKind {
    fn from_u8(v: u8) -> Option<Self> {
        use EventKind::*;
        Some(match v {
            1 => SectorActivated,
            2 => SectorChanged,
            3 => IntensityChange,
            4 => SectionDeactivated,
            5 => SessionStarted,
            6 => SessionEnded,
            7 => PassingSectorChange,
            8 => PossibleMechanicalFailure,
            9 => ErrorNoData,
            _ => return None,
        })
    }
}

/// A single detected event, carrying up to four parameters whose meaning
/// depends on `kind` (mirroring the CAN `EVENT` frame's `p0..p3` fields).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub p0: u8,
    pub p1: u8,
    pub p2: u8,
    pub p3: u16,
}

impl Event {
    fn new(kind: EventKind) -> Self {
        Self { kind, p0: 0, p1: 0, p2: 0, p3: 0 }
    }

    /// Build an [`Event`] straight from a device's `EVENT` frame fields, for
    /// devices whose event detection runs on-device rather than on the
    /// host. Returns `None` for an `event_type` byte this host doesn't
    /// recognize.
    pub fn from_wire(event_type: u8, p0: u8, p1: u8, p2: u8, p3: u16) -> Option<Self> {
        let kind = EventKind::from_u8(event_type)?;
        Some(Self { kind, p0, p1, p2, p3 })
    }

    pub(crate) fn sector_activated(sector: u8, elev: u8, speed: u8, stamp: u16) -> Self {
        Self { p0: sector, p1: elev, p2: speed, p3: stamp, ..Self::new(EventKind::SectorActivated) }
    }

    pub(crate) fn session_started(stamp: u16) -> Self {
        Self { p3: stamp, ..Self::new(EventKind::SessionStarted) }
    }

    pub(crate) fn passing_sector_change(sector: u8, stamp: u16) -> Self {
        Self { p0: sector, p3: stamp, ..Self::new(EventKind::PassingSectorChange) }
    }

    pub(crate) fn sector_changed(from: u8, to: u8, stamp: u16) -> Self {
        Self { p0: from, p1: to, p3: stamp, ..Self::new(EventKind::SectorChanged) }
    }

    pub(crate) fn intensity_change(sector: u8, elev: u8, speed: u8, stamp: u16) -> Self {
        Self { p0: sector, p1: elev, p2: speed, p3: stamp, ..Self::new(EventKind::IntensityChange) }
    }

    pub(crate) fn section_deactivated(sector: u8, stamp: u16) -> Self {
        Self { p0: sector, p3: stamp, ..Self::new(EventKind::SectionDeactivated) }
    }

    pub(crate) fn session_ended(stamp: u16) -> Self {
        Self { p3: stamp, ..Self::new(EventKind::SessionEnded) }
    }

    pub(crate) fn possible_mechanical_failure(sector: u8, stamp: u16) -> Self {
        Self { p0: sector, p3: stamp, ..Self::new(EventKind::PossibleMechanicalFailure) }
    }

    pub(crate) fn error_no_data(stamp: u16) -> Self {
        Self { p3: stamp, ..Self::new(EventKind::ErrorNoData) }
    }
}
