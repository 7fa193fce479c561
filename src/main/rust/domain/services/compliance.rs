//! Compliance classification of detected objects.
//!
//! Objects reported for the same frame are grouped into subjects (inferred
//! people) and every subject gets a compliant/violation verdict. Each object
//! inherits the verdict of its subject, so per-object counts always add up to
//! the number of objects classified.

use std::collections::BTreeSet;

use crate::domain::value_objects::DetectedObject;

/// How co-occurring objects are grouped into subjects
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GroupingMode {
    /// Every object is its own subject
    PerObject,
    /// Objects whose box centres are within the distance (transitively) share a subject
    Proximity { max_center_distance: f32 },
}

/// Objects inferred to belong to one person
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Indices into the classified object slice
    pub members: Vec<usize>,
    pub labels: BTreeSet<String>,
}

impl Subject {
    fn from_members(objects: &[DetectedObject], members: Vec<usize>) -> Self {
        let labels = members
            .iter()
            .map(|&i| objects[i].class_label.clone())
            .collect();
        Self { members, labels }
    }
}

/// Pluggable compliance rule; deployments differ in what PPE they require.
pub trait CompliancePolicy: Send + Sync {
    fn group(&self, objects: &[DetectedObject]) -> Vec<Subject>;

    fn is_compliant(&self, subject: &Subject) -> bool;

    /// Per-object verdicts, `true` meaning compliant. Objects left out by
    /// `group` count as violations.
    fn classify(&self, objects: &[DetectedObject]) -> Vec<bool> {
        let mut verdicts = vec![false; objects.len()];
        for subject in self.group(objects) {
            let compliant = self.is_compliant(&subject);
            for &member in &subject.members {
                if let Some(slot) = verdicts.get_mut(member) {
                    *slot = compliant;
                }
            }
        }
        verdicts
    }
}

/// Built-in policy driven by the configured set of required PPE labels
#[derive(Debug, Clone)]
pub struct RequiredPpePolicy {
    required: BTreeSet<String>,
    grouping: GroupingMode,
}

impl RequiredPpePolicy {
    pub fn new(required: BTreeSet<String>, grouping: GroupingMode) -> Self {
        let required = required.into_iter().map(|l| l.to_ascii_lowercase()).collect();
        Self { required, grouping }
    }

    fn group_by_proximity(objects: &[DetectedObject], max_distance: f32) -> Vec<Subject> {
        let mut parent: Vec<usize> = (0..objects.len()).collect();

        fn root(parent: &mut [usize], mut i: usize) -> usize {
            while parent[i] != i {
                parent[i] = parent[parent[i]];
                i = parent[i];
            }
            i
        }

        for a in 0..objects.len() {
            for b in (a + 1)..objects.len() {
                let distance = objects[a]
                    .bounding_box
                    .center_distance(&objects[b].bounding_box);
                if distance <= max_distance {
                    let (ra, rb) = (root(&mut parent, a), root(&mut parent, b));
                    if ra != rb {
                        parent[rb] = ra;
                    }
                }
            }
        }

        let mut groups: Vec<(usize, Vec<usize>)> = Vec::new();
        for i in 0..objects.len() {
            let r = root(&mut parent, i);
            match groups.iter_mut().find(|(gr, _)| *gr == r) {
                Some((_, members)) => members.push(i),
                None => groups.push((r, vec![i])),
            }
        }

        groups
            .into_iter()
            .map(|(_, members)| Subject::from_members(objects, members))
            .collect()
    }
}

impl CompliancePolicy for RequiredPpePolicy {
    fn group(&self, objects: &[DetectedObject]) -> Vec<Subject> {
        match self.grouping {
            GroupingMode::PerObject => (0..objects.len())
                .map(|i| Subject::from_members(objects, vec![i]))
                .collect(),
            GroupingMode::Proximity {
                max_center_distance,
            } => Self::group_by_proximity(objects, max_center_distance),
        }
    }

    fn is_compliant(&self, subject: &Subject) -> bool {
        let labels: BTreeSet<String> = subject
            .labels
            .iter()
            .map(|l| l.to_ascii_lowercase())
            .collect();

        match self.grouping {
            // A lone object is compliant when it is one of the required items
            GroupingMode::PerObject => labels.iter().any(|l| self.required.contains(l)),
            GroupingMode::Proximity { .. } => self.required.is_subset(&labels),
        }
    }
}
