//! In-memory registration store.
//!
//! Owns the entities between calls and enforces the write-time rules:
//! unique names, one teacher per subject, cascades on delete. The validator
//! and analyzer only ever see a [`Dataset`] snapshot of it.

use crate::data::{
    ClassId, Dataset, Grid, Room, RoomId, RoomKind, SchoolClass, Shift, Slot, Subject, SubjectId,
    Teacher, TeacherId, DEFAULT_ROOM_CAPACITY, class_rooms,
};
use log::{info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: u32 },
    #[error("{kind} name must not be empty")]
    EmptyName { kind: &'static str },
    #[error("a {kind} named {name} already exists")]
    DuplicateName { kind: &'static str, name: String },
    #[error("class {0} does not exist")]
    UnknownClass(ClassId),
    #[error("subject needs a positive load for at least one class")]
    EmptyLoad,
    #[error("subject {0} does not exist")]
    UnknownSubject(SubjectId),
    #[error("subject {subject_id} is already taught by teacher {teacher_id}")]
    SubjectTaken {
        subject_id: SubjectId,
        teacher_id: TeacherId,
    },
    #[error("teacher needs at least one available slot")]
    EmptyAvailability,
    #[error("{0} is outside the weekly grid")]
    SlotOutsideGrid(Slot),
    #[error("no {kind} ids left to assign")]
    IdSpaceExhausted { kind: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewClass {
    pub name: String,
    #[serde(default)]
    pub shift: Shift,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClassEdit {
    pub name: Option<String>,
    pub shift: Option<Shift>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubject {
    pub name: String,
    pub load_by_class: BTreeMap<ClassId, u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectEdit {
    pub name: Option<String>,
    pub load_by_class: Option<BTreeMap<ClassId, u32>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub name: String,
    pub subject_id: SubjectId,
    pub availability: BTreeSet<Slot>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherEdit {
    pub name: Option<String>,
    pub subject_id: Option<SubjectId>,
    pub availability: Option<BTreeSet<Slot>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRoom {
    pub name: String,
    #[serde(default)]
    pub kind: RoomKind,
    #[serde(default)]
    pub shared: bool,
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoomEdit {
    pub name: Option<String>,
    pub kind: Option<RoomKind>,
    pub shared: Option<bool>,
    pub capacity: Option<u32>,
}

/// Next id per entity type. Counters only move forward.
#[derive(Debug, Clone, Copy)]
struct NextIds {
    class: ClassId,
    subject: SubjectId,
    teacher: TeacherId,
    room: RoomId,
}

impl Default for NextIds {
    fn default() -> Self {
        Self {
            class: 1,
            subject: 101,
            teacher: 201,
            room: 501,
        }
    }
}

fn resume(
    kind: &'static str,
    ids: impl Iterator<Item = u32>,
    floor: u32,
) -> Result<u32, RegistryError> {
    match ids.max() {
        None => Ok(floor),
        Some(max) => max
            .checked_add(1)
            .map(|next| floor.max(next))
            .ok_or(RegistryError::IdSpaceExhausted { kind }),
    }
}

fn take(kind: &'static str, counter: &mut u32) -> Result<u32, RegistryError> {
    let id = *counter;
    *counter = id
        .checked_add(1)
        .ok_or(RegistryError::IdSpaceExhausted { kind })?;
    Ok(id)
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    grid: Grid,
    classes: BTreeMap<ClassId, SchoolClass>,
    subjects: BTreeMap<SubjectId, Subject>,
    teachers: BTreeMap<TeacherId, Teacher>,
    rooms: BTreeMap<RoomId, Room>,
    // one teacher per subject
    teacher_by_subject: HashMap<SubjectId, TeacherId>,
    next_id: NextIds,
}

impl Registry {
    pub fn new(grid: Grid) -> Self {
        Self {
            grid,
            ..Self::default()
        }
    }

    pub fn grid(&self) -> Grid {
        self.grid
    }

    pub fn snapshot(&self) -> Dataset {
        Dataset {
            classes: self.classes.values().cloned().collect(),
            subjects: self.subjects.values().cloned().collect(),
            teachers: self.teachers.values().cloned().collect(),
            rooms: self.rooms.values().cloned().collect(),
        }
    }

    /// Replaces the whole contents with an imported document. Counters resume
    /// above the highest imported id so retired ids stay retired. A document
    /// holding the largest possible id is refused and leaves the store as it was.
    pub fn import(&mut self, dataset: Dataset) -> Result<(), RegistryError> {
        let defaults = NextIds::default();
        self.next_id = NextIds {
            class: resume(
                "class",
                dataset.classes.iter().map(|c| c.id),
                defaults.class.max(self.next_id.class),
            )?,
            subject: resume(
                "subject",
                dataset.subjects.iter().map(|s| s.id),
                defaults.subject.max(self.next_id.subject),
            )?,
            teacher: resume(
                "teacher",
                dataset.teachers.iter().map(|t| t.id),
                defaults.teacher.max(self.next_id.teacher),
            )?,
            room: resume(
                "room",
                dataset.rooms.iter().map(|r| r.id),
                defaults.room.max(self.next_id.room),
            )?,
        };

        self.classes = dataset.classes.into_iter().map(|c| (c.id, c)).collect();
        self.subjects = dataset.subjects.into_iter().map(|s| (s.id, s)).collect();
        self.teachers = dataset.teachers.into_iter().map(|t| (t.id, t)).collect();
        self.rooms = dataset.rooms.into_iter().map(|r| (r.id, r)).collect();

        self.teacher_by_subject.clear();
        for teacher in self.teachers.values() {
            if let Some(subject_id) = teacher.subject_id {
                self.teacher_by_subject.entry(subject_id).or_insert(teacher.id);
            }
        }
        info!(
            "Imported {} classes, {} subjects, {} teachers, {} rooms",
            self.classes.len(),
            self.subjects.len(),
            self.teachers.len(),
            self.rooms.len()
        );
        Ok(())
    }

    /// Class to exclusive room pairing handed to the solver.
    pub fn class_rooms(&self) -> BTreeMap<ClassId, RoomId> {
        let dataset = self.snapshot();
        class_rooms(&dataset.classes, &dataset.rooms)
    }

    pub fn teacher_for_subject(&self, subject_id: SubjectId) -> Option<&Teacher> {
        self.teacher_by_subject
            .get(&subject_id)
            .and_then(|id| self.teachers.get(id))
    }

    // ---- classes ----

    pub fn add_class(&mut self, new: NewClass) -> Result<SchoolClass, RegistryError> {
        let name = unique_name("class", &new.name, &self.classes, None)?;
        let class = SchoolClass {
            id: take("class", &mut self.next_id.class)?,
            name,
            shift: new.shift,
        };
        info!("Added class {} ({})", class.name, class.id);
        self.classes.insert(class.id, class.clone());
        Ok(class)
    }

    pub fn edit_class(
        &mut self,
        id: ClassId,
        edit: ClassEdit,
    ) -> Result<SchoolClass, RegistryError> {
        if !self.classes.contains_key(&id) {
            return Err(RegistryError::NotFound { kind: "class", id });
        }
        let name = edit
            .name
            .map(|n| unique_name("class", &n, &self.classes, Some(id)))
            .transpose()?;

        let class = self
            .classes
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { kind: "class", id })?;
        if let Some(name) = name {
            class.name = name;
        }
        if let Some(shift) = edit.shift {
            class.shift = shift;
        }
        Ok(class.clone())
    }

    /// Removes the class and its entry from every subject's load.
    pub fn delete_class(&mut self, id: ClassId) -> Result<SchoolClass, RegistryError> {
        let class = self
            .classes
            .remove(&id)
            .ok_or(RegistryError::NotFound { kind: "class", id })?;
        let affected = self
            .subjects
            .values_mut()
            .filter_map(|s| s.load_by_class.remove(&id))
            .count();
        info!("Deleted class {} ({id}), removed from {affected} subject loads", class.name);
        Ok(class)
    }

    // ---- subjects ----

    pub fn add_subject(&mut self, new: NewSubject) -> Result<Subject, RegistryError> {
        let name = unique_name("subject", &new.name, &self.subjects, None)?;
        let load_by_class = self.clean_load(new.load_by_class)?;
        let subject = Subject {
            id: take("subject", &mut self.next_id.subject)?,
            name,
            load_by_class,
        };
        info!("Added subject {} ({})", subject.name, subject.id);
        self.subjects.insert(subject.id, subject.clone());
        Ok(subject)
    }

    pub fn edit_subject(
        &mut self,
        id: SubjectId,
        edit: SubjectEdit,
    ) -> Result<Subject, RegistryError> {
        if !self.subjects.contains_key(&id) {
            return Err(RegistryError::NotFound { kind: "subject", id });
        }
        let name = edit
            .name
            .map(|n| unique_name("subject", &n, &self.subjects, Some(id)))
            .transpose()?;
        let load = edit.load_by_class.map(|l| self.clean_load(l)).transpose()?;

        let subject = self
            .subjects
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { kind: "subject", id })?;
        if let Some(name) = name {
            subject.name = name;
        }
        if let Some(load) = load {
            subject.load_by_class = load;
        }
        let subject = subject.clone();
        self.warn_if_short(id);
        Ok(subject)
    }

    /// Removes the subject. Its teacher stays registered without a subject.
    pub fn delete_subject(&mut self, id: SubjectId) -> Result<Subject, RegistryError> {
        let subject = self
            .subjects
            .remove(&id)
            .ok_or(RegistryError::NotFound { kind: "subject", id })?;
        if let Some(teacher_id) = self.teacher_by_subject.remove(&id) {
            if let Some(teacher) = self.teachers.get_mut(&teacher_id) {
                teacher.subject_id = None;
                info!("Teacher {} no longer has a subject", teacher.name);
            }
        }
        info!("Deleted subject {} ({id})", subject.name);
        Ok(subject)
    }

    // ---- teachers ----

    pub fn add_teacher(&mut self, new: NewTeacher) -> Result<Teacher, RegistryError> {
        let name = unique_name("teacher", &new.name, &self.teachers, None)?;
        self.check_subject_free(new.subject_id, None)?;
        let availability = self.check_availability(new.availability)?;

        let teacher = Teacher {
            id: take("teacher", &mut self.next_id.teacher)?,
            name,
            subject_id: Some(new.subject_id),
            availability,
        };
        self.teacher_by_subject.insert(new.subject_id, teacher.id);
        self.teachers.insert(teacher.id, teacher.clone());
        info!("Added teacher {} ({})", teacher.name, teacher.id);
        self.warn_if_short(new.subject_id);
        Ok(teacher)
    }

    pub fn edit_teacher(
        &mut self,
        id: TeacherId,
        edit: TeacherEdit,
    ) -> Result<Teacher, RegistryError> {
        let current = self
            .teachers
            .get(&id)
            .ok_or(RegistryError::NotFound { kind: "teacher", id })?;
        let previous_subject = current.subject_id;

        let name = edit
            .name
            .map(|n| unique_name("teacher", &n, &self.teachers, Some(id)))
            .transpose()?;
        if let Some(subject_id) = edit.subject_id {
            self.check_subject_free(subject_id, Some(id))?;
        }
        let availability = edit.availability.map(|a| self.check_availability(a)).transpose()?;

        if let Some(subject_id) = edit.subject_id {
            if let Some(previous) = previous_subject {
                self.teacher_by_subject.remove(&previous);
            }
            self.teacher_by_subject.insert(subject_id, id);
        }
        let teacher = self
            .teachers
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { kind: "teacher", id })?;
        if let Some(name) = name {
            teacher.name = name;
        }
        if let Some(subject_id) = edit.subject_id {
            teacher.subject_id = Some(subject_id);
        }
        if let Some(availability) = availability {
            teacher.availability = availability;
        }
        let teacher = teacher.clone();
        if let Some(subject_id) = teacher.subject_id {
            self.warn_if_short(subject_id);
        }
        Ok(teacher)
    }

    /// Removes the teacher and frees their subject.
    pub fn delete_teacher(&mut self, id: TeacherId) -> Result<Teacher, RegistryError> {
        let teacher = self
            .teachers
            .remove(&id)
            .ok_or(RegistryError::NotFound { kind: "teacher", id })?;
        if let Some(subject_id) = teacher.subject_id {
            if self.teacher_by_subject.get(&subject_id) == Some(&id) {
                self.teacher_by_subject.remove(&subject_id);
            }
        }
        info!("Deleted teacher {} ({id})", teacher.name);
        Ok(teacher)
    }

    // ---- rooms ----

    pub fn add_room(&mut self, new: NewRoom) -> Result<Room, RegistryError> {
        let name = unique_name("room", &new.name, &self.rooms, None)?;
        let room = Room {
            id: take("room", &mut self.next_id.room)?,
            name,
            kind: new.kind,
            shared: new.shared,
            capacity: new.capacity.filter(|c| *c > 0).unwrap_or(DEFAULT_ROOM_CAPACITY),
        };
        info!("Added room {} ({})", room.name, room.id);
        self.rooms.insert(room.id, room.clone());
        Ok(room)
    }

    pub fn edit_room(&mut self, id: RoomId, edit: RoomEdit) -> Result<Room, RegistryError> {
        if !self.rooms.contains_key(&id) {
            return Err(RegistryError::NotFound { kind: "room", id });
        }
        let name = edit
            .name
            .map(|n| unique_name("room", &n, &self.rooms, Some(id)))
            .transpose()?;

        let room = self
            .rooms
            .get_mut(&id)
            .ok_or(RegistryError::NotFound { kind: "room", id })?;
        if let Some(name) = name {
            room.name = name;
        }
        if let Some(kind) = edit.kind {
            room.kind = kind;
        }
        if let Some(shared) = edit.shared {
            room.shared = shared;
        }
        if let Some(capacity) = edit.capacity.filter(|c| *c > 0) {
            room.capacity = capacity;
        }
        Ok(room.clone())
    }

    pub fn delete_room(&mut self, id: RoomId) -> Result<Room, RegistryError> {
        let room = self
            .rooms
            .remove(&id)
            .ok_or(RegistryError::NotFound { kind: "room", id })?;
        info!("Deleted room {} ({id})", room.name);
        Ok(room)
    }

    // ---- helpers ----

    fn clean_load(
        &self,
        load: BTreeMap<ClassId, u32>,
    ) -> Result<BTreeMap<ClassId, u32>, RegistryError> {
        let load: BTreeMap<ClassId, u32> = load
            .into_iter()
            .filter(|(_, count)| *count > 0)
            .collect();
        if let Some(unknown) = load.keys().find(|id| !self.classes.contains_key(id)) {
            return Err(RegistryError::UnknownClass(*unknown));
        }
        if load.is_empty() {
            return Err(RegistryError::EmptyLoad);
        }
        Ok(load)
    }

    fn check_subject_free(
        &self,
        subject_id: SubjectId,
        teacher: Option<TeacherId>,
    ) -> Result<(), RegistryError> {
        if !self.subjects.contains_key(&subject_id) {
            return Err(RegistryError::UnknownSubject(subject_id));
        }
        match self.teacher_by_subject.get(&subject_id) {
            Some(&teacher_id) if Some(teacher_id) != teacher => Err(RegistryError::SubjectTaken {
                subject_id,
                teacher_id,
            }),
            _ => Ok(()),
        }
    }

    fn check_availability(
        &self,
        availability: BTreeSet<Slot>,
    ) -> Result<BTreeSet<Slot>, RegistryError> {
        if availability.is_empty() {
            return Err(RegistryError::EmptyAvailability);
        }
        if let Some(slot) = availability.iter().find(|s| !self.grid.contains(**s)) {
            return Err(RegistryError::SlotOutsideGrid(*slot));
        }
        Ok(availability)
    }

    fn warn_if_short(&self, subject_id: SubjectId) {
        let (Some(subject), Some(teacher)) = (
            self.subjects.get(&subject_id),
            self.teacher_for_subject(subject_id),
        ) else {
            return;
        };
        let classes: Vec<SchoolClass> = self.classes.values().cloned().collect();
        let load = subject.required_load(&classes);
        if (teacher.availability.len() as u64) < load {
            warn!(
                "Teacher {} has {} available slots but subject {} requires {load} lessons",
                teacher.name,
                teacher.availability.len(),
                subject.name
            );
        }
    }
}

trait Named {
    fn name(&self) -> &str;
}

impl Named for SchoolClass {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Subject {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Teacher {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for Room {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Trims `name` and checks it is non-empty and unique (case-insensitive)
/// among `existing`, ignoring the entity being edited.
fn unique_name<T: Named>(
    kind: &'static str,
    name: &str,
    existing: &BTreeMap<u32, T>,
    editing: Option<u32>,
) -> Result<String, RegistryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(RegistryError::EmptyName { kind });
    }
    let lowered = name.to_lowercase();
    let taken = existing
        .iter()
        .any(|(id, other)| Some(*id) != editing && other.name().trim().to_lowercase() == lowered);
    if taken {
        return Err(RegistryError::DuplicateName {
            kind,
            name: name.to_string(),
        });
    }
    Ok(name.to_string())
}
