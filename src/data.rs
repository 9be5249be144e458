use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// Type aliases for clarity
pub type ClassId = u32;
pub type SubjectId = u32;
pub type TeacherId = u32;
pub type RoomId = u32;
pub type Day = u32;
pub type Period = u32;

pub const DEFAULT_ROOM_CAPACITY: u32 = 30;

/// Largest grid the service accepts: a full week of hourly periods.
pub const MAX_DAYS: u32 = 7;
pub const MAX_PERIODS: u32 = 24;

/// Time of day a class attends school.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Shift {
    #[default]
    Morning,
    Afternoon,
    Evening,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    #[default]
    Normal,
    Lab,
    Court,
    Library,
}

/// One cell of the weekly grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub struct Slot {
    pub day: Day,
    pub period: Period,
}

impl Slot {
    pub fn new(day: Day, period: Period) -> Self {
        Self { day, period }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} period {}", self.day, self.period)
    }
}

/// Shape of the weekly grid: `days` weekdays of `periods` lessons each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Grid {
    pub days: u32,
    pub periods: u32,
}

impl Default for Grid {
    fn default() -> Self {
        Self { days: 5, periods: 6 }
    }
}

impl Grid {
    pub fn contains(&self, slot: Slot) -> bool {
        slot.day < self.days && slot.period < self.periods
    }

    /// Number of lessons a single class can attend per week.
    pub fn capacity(&self) -> u64 {
        u64::from(self.days) * u64::from(self.periods)
    }

    /// Whether the grid fits within `MAX_DAYS` x `MAX_PERIODS` and is not empty.
    pub fn is_supported(&self) -> bool {
        (1..=MAX_DAYS).contains(&self.days) && (1..=MAX_PERIODS).contains(&self.periods)
    }
}

/// A student cohort.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolClass {
    pub id: ClassId,
    pub name: String,
    #[serde(default)]
    pub shift: Shift,
}

/// A course with its weekly lesson count per class.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    #[serde(default)]
    pub load_by_class: BTreeMap<ClassId, u32>,
}

impl Subject {
    /// Weekly lessons this subject needs, counting only positive entries for
    /// classes present in `classes`.
    pub fn required_load(&self, classes: &[SchoolClass]) -> u64 {
        self.load_by_class
            .iter()
            .filter(|(class_id, count)| **count > 0 && classes.iter().any(|c| c.id == **class_id))
            .map(|(_, count)| u64::from(*count))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Teacher {
    pub id: TeacherId,
    pub name: String,
    #[serde(default)]
    pub subject_id: Option<SubjectId>,
    #[serde(default)]
    pub availability: BTreeSet<Slot>,
}

fn default_capacity() -> u32 {
    DEFAULT_ROOM_CAPACITY
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    #[serde(default)]
    pub kind: RoomKind,
    /// Shared rooms are never reserved for a single class.
    #[serde(default)]
    pub shared: bool,
    #[serde(default = "default_capacity")]
    pub capacity: u32,
}

/// One lesson placed by the solver.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlacement {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub teacher_id: TeacherId,
    pub room_id: RoomId,
    pub day: Day,
    pub period: Period,
}

impl LessonPlacement {
    pub fn slot(&self) -> Slot {
        Slot::new(self.day, self.period)
    }
}

/// The complete registration document.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    #[serde(default)]
    pub classes: Vec<SchoolClass>,
    #[serde(default)]
    pub subjects: Vec<Subject>,
    #[serde(default)]
    pub teachers: Vec<Teacher>,
    #[serde(default)]
    pub rooms: Vec<Room>,
}

/// Pairs each class (ascending id) with the next unused non-shared room
/// (ascending id). Classes left over once the rooms run out get no entry.
pub fn class_rooms(classes: &[SchoolClass], rooms: &[Room]) -> BTreeMap<ClassId, RoomId> {
    let mut class_ids: Vec<ClassId> = classes.iter().map(|c| c.id).collect();
    class_ids.sort_unstable();
    let mut room_ids: Vec<RoomId> = rooms.iter().filter(|r| !r.shared).map(|r| r.id).collect();
    room_ids.sort_unstable();

    class_ids.into_iter().zip(room_ids).collect()
}
