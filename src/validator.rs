//! Feasibility checks over the registered entities.
//!
//! Decides whether a [`Dataset`] is worth handing to the solver and lists
//! every problem found. All rules run; none short-circuits another. Within
//! a rule, findings follow ascending entity id.

use crate::data::{Dataset, Grid, RoomKind, SchoolClass, Slot, Subject, SubjectId, Teacher};
use itertools::Itertools;
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Which check produced a finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Rule {
    EmptyCollection,
    ClassWithoutLessons,
    SubjectWithoutTeacher,
    DanglingSubject,
    InsufficientAvailability,
    InsufficientRooms,
    UnstaffedSubject,
    ComfortableAvailability,
    DuplicateName,
    SharedSubject,
    ClassOverCapacity,
    SlotOutsideGrid,
    CrowdedSlot,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub rule: Rule,
    pub message: String,
}

impl Finding {
    fn new(rule: Rule, message: impl Into<String>) -> Self {
        Self {
            rule,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub classes: usize,
    pub subjects: usize,
    pub teachers: usize,
    pub rooms: usize,
    pub rooms_by_kind: BTreeMap<RoomKind, usize>,
    pub shared_rooms: usize,
    pub weekly_lessons: u64,
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Blocking problems.
    pub errors: Vec<Finding>,
    pub warnings: Vec<Finding>,
    pub infos: Vec<Finding>,
    pub totals: Totals,
}

impl Report {
    pub fn is_ready(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, rule: Rule, message: String) {
        self.errors.push(Finding::new(rule, message));
    }

    fn warning(&mut self, rule: Rule, message: String) {
        self.warnings.push(Finding::new(rule, message));
    }

    fn info(&mut self, rule: Rule, message: String) {
        self.infos.push(Finding::new(rule, message));
    }
}

/// True when nothing blocks generation.
pub fn is_ready(report: &Report) -> bool {
    report.is_ready()
}

/// Validates against the default 5 x 6 grid.
pub fn validate(dataset: &Dataset) -> Report {
    validate_with_grid(dataset, Grid::default())
}

pub fn validate_with_grid(dataset: &Dataset, grid: Grid) -> Report {
    let classes = sorted_by_id(&dataset.classes, |c| c.id);
    let subjects = sorted_by_id(&dataset.subjects, |s| s.id);
    let teachers = sorted_by_id(&dataset.teachers, |t| t.id);

    let subject_map: HashMap<SubjectId, &Subject> = subjects.iter().map(|s| (s.id, *s)).collect();
    // first teacher (lowest id) wins when a subject is claimed twice
    let teachers_by_subject: HashMap<SubjectId, Vec<&Teacher>> = teachers
        .iter()
        .filter_map(|t| t.subject_id.map(|s| (s, *t)))
        .into_group_map();

    let mut report = Report::default();

    // 1. empty collections
    for (label, len) in [
        ("classes", dataset.classes.len()),
        ("subjects", dataset.subjects.len()),
        ("teachers", dataset.teachers.len()),
        ("rooms", dataset.rooms.len()),
    ] {
        if len == 0 {
            report.error(Rule::EmptyCollection, format!("no {label} registered"));
        }
    }

    // 2. classes without lessons
    for class in &classes {
        if class_load(class, &subjects) == 0 {
            report.error(
                Rule::ClassWithoutLessons,
                format!("class {} has no lessons", class.name),
            );
        }
    }

    // 3. subjects without a teacher
    let unstaffed: Vec<&Subject> = subjects
        .iter()
        .filter(|s| !teachers_by_subject.contains_key(&s.id))
        .copied()
        .collect();
    for subject in &unstaffed {
        report.error(
            Rule::SubjectWithoutTeacher,
            format!("no teacher for subject {}", subject.name),
        );
    }

    // 4. teachers pointing at a missing subject
    for teacher in &teachers {
        match teacher.subject_id {
            None => report.error(
                Rule::DanglingSubject,
                format!("teacher {} has no subject assigned", teacher.name),
            ),
            Some(id) if !subject_map.contains_key(&id) => report.error(
                Rule::DanglingSubject,
                format!(
                    "teacher {} is assigned to subject {id}, which no longer exists",
                    teacher.name
                ),
            ),
            Some(_) => {}
        }
    }

    // 5. availability below the required load
    let loads: Vec<(&Teacher, u64)> = teachers
        .iter()
        .filter_map(|t| {
            let subject = subject_map.get(&t.subject_id?)?;
            Some((*t, subject.required_load(&dataset.classes)))
        })
        .collect();
    for (teacher, load) in &loads {
        let available = teacher.availability.len();
        if available == 0 {
            report.error(
                Rule::InsufficientAvailability,
                format!("teacher {} has no available slots", teacher.name),
            );
        } else if (available as u64) < *load {
            report.error(
                Rule::InsufficientAvailability,
                format!(
                    "teacher {} needs {load} slots but has only {available} available",
                    teacher.name
                ),
            );
        }
    }

    // 6. exclusive rooms
    let exclusive_rooms = dataset.rooms.iter().filter(|r| !r.shared).count();
    if exclusive_rooms < dataset.classes.len() {
        report.warning(
            Rule::InsufficientRooms,
            format!(
                "{} classes but only {exclusive_rooms} non-shared rooms",
                dataset.classes.len()
            ),
        );
    }

    // 7. advisory twin of rule 3
    for subject in &unstaffed {
        report.warning(
            Rule::UnstaffedSubject,
            format!("subject {} has no teacher assigned", subject.name),
        );
    }

    // 8. generous availability
    for (teacher, load) in &loads {
        let available = teacher.availability.len() as u64;
        if available.saturating_mul(2) > load.saturating_mul(3) {
            report.info(
                Rule::ComfortableAvailability,
                format!(
                    "teacher {} has {available} available slots for {load} lessons",
                    teacher.name
                ),
            );
        }
    }

    // 9. duplicate names
    let names = [
        ("class", dataset.classes.iter().map(|c| c.name.as_str()).collect_vec()),
        ("subject", dataset.subjects.iter().map(|s| s.name.as_str()).collect_vec()),
        ("teacher", dataset.teachers.iter().map(|t| t.name.as_str()).collect_vec()),
        ("room", dataset.rooms.iter().map(|r| r.name.as_str()).collect_vec()),
    ];
    for (label, list) in names {
        for name in list.iter().map(|n| n.trim().to_lowercase()).duplicates() {
            report.warning(
                Rule::DuplicateName,
                format!("more than one {label} is named {name}"),
            );
        }
    }

    // 10. subjects claimed by several teachers
    for subject in &subjects {
        if let Some(claimants) = teachers_by_subject.get(&subject.id) {
            if claimants.len() > 1 {
                report.warning(
                    Rule::SharedSubject,
                    format!(
                        "subject {} is assigned to {} teachers: {}",
                        subject.name,
                        claimants.len(),
                        claimants.iter().map(|t| t.name.as_str()).join(", ")
                    ),
                );
            }
        }
    }

    // 11. classes that cannot fit their week
    for class in &classes {
        let lessons = class_load(class, &subjects);
        if lessons > grid.capacity() {
            report.warning(
                Rule::ClassOverCapacity,
                format!(
                    "class {} needs {lessons} lessons but the week holds {}",
                    class.name,
                    grid.capacity()
                ),
            );
        }
    }

    // 12. availability outside the grid
    for teacher in &teachers {
        let outside = teacher.availability.iter().filter(|s| !grid.contains(**s)).count();
        if outside > 0 {
            report.warning(
                Rule::SlotOutsideGrid,
                format!(
                    "teacher {} offers {outside} slots outside the {}x{} grid",
                    teacher.name, grid.days, grid.periods
                ),
            );
        }
    }

    // 13. more teachers free in a slot than there are rooms
    let free_by_slot: BTreeMap<Slot, Vec<&str>> = teachers
        .iter()
        .flat_map(|t| t.availability.iter().map(|slot| (*slot, t.name.as_str())))
        .into_group_map()
        .into_iter()
        .collect();
    for (slot, names) in &free_by_slot {
        if names.len() > dataset.rooms.len() {
            report.warning(
                Rule::CrowdedSlot,
                format!(
                    "{slot}: {} teachers available ({}) but only {} rooms",
                    names.len(),
                    names.join(", "),
                    dataset.rooms.len()
                ),
            );
        }
    }

    report.totals = Totals {
        classes: dataset.classes.len(),
        subjects: dataset.subjects.len(),
        teachers: dataset.teachers.len(),
        rooms: dataset.rooms.len(),
        rooms_by_kind: dataset.rooms.iter().map(|r| r.kind).counts().into_iter().collect(),
        shared_rooms: dataset.rooms.iter().filter(|r| r.shared).count(),
        weekly_lessons: subjects.iter().map(|s| s.required_load(&dataset.classes)).sum(),
    };

    debug!(
        "Validation finished: {} errors, {} warnings, {} infos",
        report.errors.len(),
        report.warnings.len(),
        report.infos.len()
    );
    report
}

fn class_load(class: &SchoolClass, subjects: &[&Subject]) -> u64 {
    subjects
        .iter()
        .filter_map(|s| s.load_by_class.get(&class.id))
        .map(|count| u64::from(*count))
        .sum()
}

fn sorted_by_id<T>(items: &[T], id: impl Fn(&T) -> u32) -> Vec<&T> {
    items.iter().sorted_by_key(|item| id(item)).collect()
}
