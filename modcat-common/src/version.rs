//! Ordering of game version strings
//!
//! Versions such as `1.20.1` compare component-wise numerically. Components
//! that are not numbers (snapshot names, `-pre1` suffixes) compare as text
//! and sort below a numeric component at the same position.

use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq)]
enum Component<'a> {
    Number(u64),
    Text(&'a str),
}

impl Ord for Component<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => a.cmp(b),
            (Component::Number(_), Component::Text(_)) => Ordering::Greater,
            (Component::Text(_), Component::Number(_)) => Ordering::Less,
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Component<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn components(version: &str) -> impl Iterator<Item = Component<'_>> {
    version
        .split(['.', '-', '+', ' '])
        .filter(|part| !part.is_empty())
        .map(|part| match part.parse::<u64>() {
            Ok(n) => Component::Number(n),
            Err(_) => Component::Text(part),
        })
}

/// Compare two game versions, oldest first
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let mut left = components(a);
    let mut right = components(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return a.cmp(b),
            // A release (1.20) is newer than its own pre-release (1.20-pre1)
            (None, Some(Component::Text(_))) => return Ordering::Greater,
            (Some(Component::Text(_)), None) => return Ordering::Less,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => match l.cmp(&r) {
                Ordering::Equal => continue,
                other => return other,
            },
        }
    }
}

/// Sort versions newest first
pub fn sort_descending(versions: &mut [String]) {
    versions.sort_by(|a, b| compare_versions(b, a));
}
