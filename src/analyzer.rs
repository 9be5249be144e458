//! Quality metrics and integrity checks over a produced timetable.
//!
//! | Metric | Definition |
//! |--------|-----------|
//! | Idle gaps | Empty periods between two lessons of one teacher on one day |
//! | Daily deviation | Population std-dev of lessons per weekday |
//! | Conflicts | Teacher, class or non-shared room booked twice in a slot; one entry per clashing resource, so two lessons sharing both teacher and room yield a teacher and a room conflict |
//! | Load mismatches | (class, subject) placed more or fewer times than required |

use crate::data::{
    ClassId, Dataset, Day, Grid, LessonPlacement, Period, RoomId, Slot, SubjectId, TeacherId,
};
use itertools::Itertools;
use log::{debug, error};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictKind {
    Teacher,
    Room,
    Class,
}

/// Several placements competing for one resource in one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    pub kind: ConflictKind,
    /// Teacher, room or class id depending on `kind`.
    pub id: u32,
    pub day: Day,
    pub period: Period,
    /// Indices into the placement list.
    pub placements: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadMismatch {
    pub class_id: ClassId,
    pub subject_id: SubjectId,
    pub required: u32,
    pub placed: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stats {
    pub lessons_per_class: BTreeMap<ClassId, u32>,
    pub lessons_per_teacher: BTreeMap<TeacherId, u32>,
    pub lessons_per_day: Vec<u32>,
    /// Total idle gaps across all teachers; 0 is optimal.
    pub idle_gaps: u32,
    pub idle_gaps_by_teacher: BTreeMap<TeacherId, u32>,
    /// Standard deviation of `lessons_per_day`.
    pub daily_load_deviation: f64,
    pub unassigned_subjects: Vec<SubjectId>,
    pub load_mismatches: Vec<LoadMismatch>,
    pub conflicts: Vec<Conflict>,
    pub out_of_grid: Vec<usize>,
    pub outside_availability: Vec<usize>,
}

impl Stats {
    /// No resource is double-booked.
    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty()
    }
}

/// Callers must pass a grid for which [`Grid::is_supported`] holds; the
/// per-day series is sized from `grid.days`.
pub fn analyze(placements: &[LessonPlacement], dataset: &Dataset, grid: Grid) -> Stats {
    let mut stats = Stats::default();

    // per-entity counts; every registered entity shows up, even with zero lessons
    stats.lessons_per_class = dataset.classes.iter().map(|c| (c.id, 0)).collect();
    stats.lessons_per_teacher = dataset.teachers.iter().map(|t| (t.id, 0)).collect();
    for p in placements {
        *stats.lessons_per_class.entry(p.class_id).or_default() += 1;
        *stats.lessons_per_teacher.entry(p.teacher_id).or_default() += 1;
    }

    stats.out_of_grid = placements
        .iter()
        .positions(|p| !grid.contains(p.slot()))
        .collect();

    // daily distribution
    stats.lessons_per_day = vec![0; grid.days as usize];
    for p in placements.iter().filter(|p| grid.contains(p.slot())) {
        stats.lessons_per_day[p.day as usize] += 1;
    }
    stats.daily_load_deviation = std_dev(&stats.lessons_per_day);

    // idle gaps per teacher and day
    let teacher_days: BTreeMap<(TeacherId, Day), Vec<Period>> = placements
        .iter()
        .map(|p| ((p.teacher_id, p.day), p.period))
        .into_group_map()
        .into_iter()
        .collect();
    for ((teacher_id, _), periods) in teacher_days {
        let gaps = idle_gaps(periods);
        *stats.idle_gaps_by_teacher.entry(teacher_id).or_default() += gaps;
        stats.idle_gaps += gaps;
    }

    // subjects never placed despite a required load
    let placed_subjects: HashSet<SubjectId> = placements.iter().map(|p| p.subject_id).collect();
    let mut subjects: Vec<_> = dataset.subjects.iter().collect();
    subjects.sort_by_key(|s| s.id);
    stats.unassigned_subjects = subjects
        .iter()
        .filter(|s| s.required_load(&dataset.classes) > 0 && !placed_subjects.contains(&s.id))
        .map(|s| s.id)
        .collect();

    // over/under assignment per (class, subject)
    let placed_pairs = placements
        .iter()
        .map(|p| (p.class_id, p.subject_id))
        .counts();
    let mut pairs: BTreeMap<(ClassId, SubjectId), (u32, u32)> = BTreeMap::new();
    for subject in &subjects {
        for (class_id, count) in &subject.load_by_class {
            if *count > 0 && dataset.classes.iter().any(|c| c.id == *class_id) {
                pairs.entry((*class_id, subject.id)).or_default().0 = *count;
            }
        }
    }
    for (pair, placed) in placed_pairs {
        pairs.entry(pair).or_default().1 = placed as u32;
    }
    stats.load_mismatches = pairs
        .into_iter()
        .filter(|(_, (required, placed))| required != placed)
        .map(|((class_id, subject_id), (required, placed))| LoadMismatch {
            class_id,
            subject_id,
            required,
            placed,
        })
        .collect();

    stats.conflicts = find_conflicts(placements, dataset);

    stats.outside_availability = placements
        .iter()
        .positions(|p| {
            dataset
                .teachers
                .iter()
                .find(|t| t.id == p.teacher_id)
                .is_some_and(|t| !t.availability.contains(&p.slot()))
        })
        .collect();

    if !stats.is_consistent() {
        error!(
            "Timetable has {} conflicts; solver output or input data is corrupt",
            stats.conflicts.len()
        );
    }
    debug!(
        "Analyzed {} placements: {} idle gaps, daily deviation {:.2}",
        placements.len(),
        stats.idle_gaps,
        stats.daily_load_deviation
    );
    stats
}

/// Sum of empty periods between consecutive lessons of a single day.
fn idle_gaps(mut periods: Vec<Period>) -> u32 {
    periods.sort_unstable();
    periods.dedup();
    periods
        .iter()
        .tuple_windows()
        .map(|(a, b)| b - a - 1)
        .sum()
}

fn std_dev(series: &[u32]) -> f64 {
    if series.is_empty() {
        return 0.0;
    }
    let n = series.len() as f64;
    let mean = series.iter().map(|&v| v as f64).sum::<f64>() / n;
    let variance = series
        .iter()
        .map(|&v| (v as f64 - mean).powi(2))
        .sum::<f64>()
        / n;
    variance.sqrt()
}

fn find_conflicts(placements: &[LessonPlacement], dataset: &Dataset) -> Vec<Conflict> {
    let shared_rooms: HashSet<RoomId> = dataset
        .rooms
        .iter()
        .filter(|r| r.shared)
        .map(|r| r.id)
        .collect();

    let keyed = placements.iter().enumerate().flat_map(|(i, p)| {
        let slot = p.slot();
        let room = (!shared_rooms.contains(&p.room_id))
            .then_some(((ConflictKind::Room, p.room_id, slot), i));
        [
            Some(((ConflictKind::Teacher, p.teacher_id, slot), i)),
            room,
            Some(((ConflictKind::Class, p.class_id, slot), i)),
        ]
        .into_iter()
        .flatten()
    });

    let groups: BTreeMap<(ConflictKind, u32, Slot), Vec<usize>> =
        keyed.into_group_map().into_iter().collect();

    groups
        .into_iter()
        .filter(|(_, indices)| indices.len() > 1)
        .map(|((kind, id, slot), placements)| Conflict {
            kind,
            id,
            day: slot.day,
            period: slot.period,
            placements,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Room, RoomKind, SchoolClass, Shift, Subject, Teacher};
    use std::collections::BTreeSet;

    fn placement(
        class_id: u32,
        subject_id: u32,
        teacher_id: u32,
        room_id: u32,
        day: u32,
        period: u32,
    ) -> LessonPlacement {
        LessonPlacement {
            class_id,
            subject_id,
            teacher_id,
            room_id,
            day,
            period,
        }
    }

    fn sample_dataset() -> Dataset {
        let all_slots: BTreeSet<Slot> = (0..5)
            .flat_map(|d| (0..6).map(move |p| Slot::new(d, p)))
            .collect();
        Dataset {
            classes: vec![
                SchoolClass {
                    id: 1,
                    name: "6A".into(),
                    shift: Shift::Morning,
                },
                SchoolClass {
                    id: 2,
                    name: "6B".into(),
                    shift: Shift::Morning,
                },
            ],
            subjects: vec![
                Subject {
                    id: 101,
                    name: "Math".into(),
                    load_by_class: BTreeMap::from([(1, 3), (2, 2)]),
                },
                Subject {
                    id: 102,
                    name: "History".into(),
                    load_by_class: BTreeMap::from([(1, 2)]),
                },
            ],
            teachers: vec![
                Teacher {
                    id: 5,
                    name: "Ana".into(),
                    subject_id: Some(101),
                    availability: all_slots.clone(),
                },
                Teacher {
                    id: 6,
                    name: "Bia".into(),
                    subject_id: Some(102),
                    availability: all_slots,
                },
            ],
            rooms: vec![
                Room {
                    id: 501,
                    name: "R1".into(),
                    kind: RoomKind::Normal,
                    shared: false,
                    capacity: 30,
                },
                Room {
                    id: 502,
                    name: "R2".into(),
                    kind: RoomKind::Normal,
                    shared: false,
                    capacity: 30,
                },
                Room {
                    id: 503,
                    name: "Court".into(),
                    kind: RoomKind::Court,
                    shared: true,
                    capacity: 60,
                },
            ],
        }
    }

    #[test]
    fn test_empty_timetable_yields_zeroed_stats() {
        let dataset = sample_dataset();
        let stats = analyze(&[], &dataset, Grid::default());

        assert!(stats.lessons_per_class.values().all(|&n| n == 0));
        assert_eq!(stats.lessons_per_class.len(), 2);
        assert!(stats.lessons_per_teacher.values().all(|&n| n == 0));
        assert_eq!(stats.idle_gaps, 0);
        assert_eq!(stats.daily_load_deviation, 0.0);
        assert!(stats.conflicts.is_empty());
        assert_eq!(stats.unassigned_subjects, vec![101, 102]);
    }

    #[test]
    fn test_idle_gaps_for_single_day() {
        let placements = vec![
            placement(1, 101, 5, 501, 0, 0),
            placement(2, 101, 5, 502, 0, 2),
            placement(1, 101, 5, 501, 0, 3),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());

        assert_eq!(stats.idle_gaps, 1);
        assert_eq!(stats.idle_gaps_by_teacher[&5], 1);
    }

    #[test]
    fn test_idle_gaps_sum_across_days_and_teachers() {
        assert_eq!(idle_gaps(vec![5, 0]), 4);
        assert_eq!(idle_gaps(vec![]), 0);
        assert_eq!(idle_gaps(vec![2, 2, 3]), 0);

        let placements = vec![
            placement(1, 101, 5, 501, 0, 0),
            placement(1, 101, 5, 501, 0, 3),
            placement(1, 102, 6, 501, 1, 1),
            placement(1, 102, 6, 501, 1, 5),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());
        assert_eq!(stats.idle_gaps, 2 + 3);
    }

    #[test]
    fn test_teacher_conflict_reported_once() {
        let placements = vec![
            placement(1, 101, 5, 501, 1, 2),
            placement(2, 101, 5, 502, 1, 2),
            placement(1, 102, 6, 501, 3, 0),
            placement(2, 101, 5, 502, 4, 4),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());

        assert_eq!(stats.conflicts.len(), 1);
        let conflict = &stats.conflicts[0];
        assert_eq!(conflict.kind, ConflictKind::Teacher);
        assert_eq!((conflict.id, conflict.day, conflict.period), (5, 1, 2));
        assert_eq!(conflict.placements, vec![0, 1]);
        assert!(!stats.is_consistent());
    }

    #[test]
    fn test_clash_on_teacher_and_room_reports_both() {
        let placements = vec![
            placement(1, 101, 5, 501, 2, 3),
            placement(2, 101, 5, 501, 2, 3),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());

        let kinds: Vec<(ConflictKind, u32)> =
            stats.conflicts.iter().map(|c| (c.kind, c.id)).collect();
        assert_eq!(kinds, vec![(ConflictKind::Teacher, 5), (ConflictKind::Room, 501)]);
        assert!(stats.conflicts.iter().all(|c| c.placements == vec![0, 1]));
    }

    #[test]
    fn test_shared_room_may_host_several_classes() {
        let placements = vec![
            placement(1, 101, 5, 503, 0, 0),
            placement(2, 102, 6, 503, 0, 0),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());
        assert!(stats.is_consistent());

        let placements = vec![
            placement(1, 101, 5, 501, 0, 0),
            placement(2, 102, 6, 501, 0, 0),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());
        assert_eq!(stats.conflicts.len(), 1);
        assert_eq!(stats.conflicts[0].kind, ConflictKind::Room);
    }

    #[test]
    fn test_daily_deviation() {
        // 5 lessons on Monday, none elsewhere: mean 1, variance (16 + 4*1) / 5 = 4
        let placements: Vec<_> = (0..5).map(|p| placement(1, 101, 5, 501, 0, p)).collect();
        let stats = analyze(&placements, &sample_dataset(), Grid::default());

        assert_eq!(stats.lessons_per_day, vec![5, 0, 0, 0, 0]);
        assert!((stats.daily_load_deviation - 2.0).abs() < 1e-9);

        let even: Vec<_> = (0..5).map(|d| placement(1, 101, 5, 501, d, 0)).collect();
        let stats = analyze(&even, &sample_dataset(), Grid::default());
        assert_eq!(stats.daily_load_deviation, 0.0);
    }

    #[test]
    fn test_load_mismatches_and_unassigned() {
        let placements = vec![
            placement(1, 101, 5, 501, 0, 0),
            placement(1, 101, 5, 501, 0, 1),
            placement(1, 101, 5, 501, 0, 2),
            placement(2, 101, 5, 502, 1, 0),
            placement(2, 101, 5, 502, 1, 1),
            placement(2, 101, 5, 502, 1, 2),
        ];
        let stats = analyze(&placements, &sample_dataset(), Grid::default());

        assert_eq!(stats.unassigned_subjects, vec![102]);
        assert_eq!(
            stats.load_mismatches,
            vec![
                LoadMismatch {
                    class_id: 1,
                    subject_id: 102,
                    required: 2,
                    placed: 0
                },
                LoadMismatch {
                    class_id: 2,
                    subject_id: 101,
                    required: 2,
                    placed: 3
                },
            ]
        );
        assert_eq!(stats.lessons_per_class[&2], 3);
        assert_eq!(stats.lessons_per_teacher[&5], 6);
    }

    #[test]
    fn test_out_of_grid_and_availability() {
        let mut dataset = sample_dataset();
        dataset.teachers[1].availability = BTreeSet::from([Slot::new(0, 0)]);
        let placements = vec![
            placement(1, 101, 5, 501, 5, 0),
            placement(1, 102, 6, 501, 2, 2),
        ];
        let stats = analyze(&placements, &dataset, Grid::default());

        assert_eq!(stats.out_of_grid, vec![0]);
        assert_eq!(stats.outside_availability, vec![0, 1]);
        assert_eq!(stats.lessons_per_day.iter().sum::<u32>(), 1);
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let dataset = sample_dataset();
        let placements = vec![
            placement(1, 101, 5, 501, 1, 2),
            placement(2, 101, 5, 502, 1, 2),
        ];
        assert_eq!(
            analyze(&placements, &dataset, Grid::default()),
            analyze(&placements, &dataset, Grid::default())
        );
    }
}
