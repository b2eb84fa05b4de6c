//! Subjects (candidates) and their running scores

use d21_core::{D21Error, D21Result, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A candidate or party that can receive votes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    pub id: SubjectId,
    pub name: String,
    pub score: i64,
}

/// One row of the tally
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectStanding {
    pub name: String,
    pub score: i64,
}

impl From<&Subject> for SubjectStanding {
    fn from(subject: &Subject) -> Self {
        Self {
            name: subject.name.clone(),
            score: subject.score,
        }
    }
}

/// Subjects in registration order, indexed by id
#[derive(Debug, Default, Clone)]
pub struct SubjectRegistry {
    subjects: Vec<Subject>,
    by_name: HashMap<String, SubjectId>,
}

impl SubjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from stored subjects, checking ids and names
    pub fn from_subjects(subjects: Vec<Subject>) -> D21Result<Self> {
        let mut registry = Self::new();
        for (index, subject) in subjects.into_iter().enumerate() {
            if subject.id.index() != index {
                return Err(D21Error::DeserializationError(format!(
                    "subject {} stored at position {}",
                    subject.id, index
                )));
            }
            registry.check_name(&subject.name).map_err(|e| {
                D21Error::DeserializationError(e.to_string())
            })?;
            registry.by_name.insert(subject.name.clone(), subject.id);
            registry.subjects.push(subject);
        }
        Ok(registry)
    }

    pub fn check_name(&self, name: &str) -> D21Result<()> {
        if name.is_empty() {
            return Err(D21Error::InvalidArgument("subject name cannot be empty".into()));
        }
        if self.by_name.contains_key(name) {
            return Err(D21Error::InvalidArgument(format!(
                "subject name '{}' is already taken",
                name
            )));
        }
        Ok(())
    }

    /// Append a new subject with a zero score
    pub fn register(&mut self, name: &str) -> D21Result<SubjectId> {
        self.check_name(name)?;

        let index = u32::try_from(self.subjects.len())
            .map_err(|_| D21Error::Internal("subject id space exhausted".into()))?;
        let id = SubjectId::new(index);
        self.subjects.push(Subject {
            id,
            name: name.to_string(),
            score: 0,
        });
        self.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    pub fn get(&self, id: SubjectId) -> Option<&Subject> {
        self.subjects.get(id.index())
    }

    pub fn contains(&self, id: SubjectId) -> bool {
        id.index() < self.subjects.len()
    }

    /// Apply a score change, returning the new score
    pub fn apply_delta(&mut self, id: SubjectId, delta: i64) -> D21Result<i64> {
        let subject = self
            .subjects
            .get_mut(id.index())
            .ok_or(D21Error::UnknownSubject(id))?;
        subject.score += delta;
        Ok(subject.score)
    }

    pub fn ids(&self) -> Vec<SubjectId> {
        self.subjects.iter().map(|s| s.id).collect()
    }

    pub fn all(&self) -> &[Subject] {
        &self.subjects
    }

    pub fn len(&self) -> usize {
        self.subjects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subjects.is_empty()
    }

    /// Score descending, ties kept in registration order
    pub fn standings(&self) -> Vec<SubjectStanding> {
        let mut ranked: Vec<&Subject> = self.subjects.iter().collect();
        // stable: equal scores keep registration order
        ranked.sort_by(|a, b| b.score.cmp(&a.score));
        ranked.into_iter().map(SubjectStanding::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_assigns_sequential_ids() {
        let mut registry = SubjectRegistry::new();
        assert_eq!(registry.register("Party A").unwrap(), SubjectId::new(0));
        assert_eq!(registry.register("Party B").unwrap(), SubjectId::new(1));
        assert_eq!(registry.get(SubjectId::new(1)).unwrap().score, 0);
        assert!(!registry.contains(SubjectId::new(2)));
    }

    #[test]
    fn test_rejects_empty_and_duplicate_names() {
        let mut registry = SubjectRegistry::new();
        assert!(matches!(
            registry.register(""),
            Err(D21Error::InvalidArgument(_))
        ));
        registry.register("Party A").unwrap();
        assert!(matches!(
            registry.register("Party A"),
            Err(D21Error::InvalidArgument(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_standings_are_stable_on_ties() {
        let mut registry = SubjectRegistry::new();
        let a = registry.register("A").unwrap();
        let b = registry.register("B").unwrap();
        let c = registry.register("C").unwrap();
        registry.register("D").unwrap();

        registry.apply_delta(c, 2).unwrap();
        registry.apply_delta(a, 1).unwrap();
        registry.apply_delta(b, 1).unwrap();

        let names: Vec<String> = registry.standings().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["C", "A", "B", "D"]);
    }

    #[test]
    fn test_from_subjects_rejects_gaps() {
        let subjects = vec![Subject {
            id: SubjectId::new(3),
            name: "X".into(),
            score: 0,
        }];
        assert!(SubjectRegistry::from_subjects(subjects).is_err());
    }
}
