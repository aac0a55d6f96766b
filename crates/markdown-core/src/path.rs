use std::cmp::Ordering;

use crate::ops::Path;

pub fn parent(path: &[usize]) -> Option<Path> {
    path.split_last().map(|(_, parent)| parent.to_vec())
}

pub fn next(path: &[usize]) -> Option<Path> {
    let (last, parent) = path.split_last()?;
    let mut next = parent.to_vec();
    next.push(last + 1);
    Some(next)
}

pub fn previous(path: &[usize]) -> Option<Path> {
    let (last, parent) = path.split_last()?;
    let mut prev = parent.to_vec();
    prev.push(last.checked_sub(1)?);
    Some(prev)
}

pub fn child(path: &[usize], ix: usize) -> Path {
    let mut child = path.to_vec();
    child.push(ix);
    child
}

pub fn is_ancestor(ancestor: &[usize], path: &[usize]) -> bool {
    ancestor.len() < path.len() && path.starts_with(ancestor)
}

pub fn is_sibling(a: &[usize], b: &[usize]) -> bool {
    a.len() == b.len() && !a.is_empty() && a[..a.len() - 1] == b[..b.len() - 1]
}

/// Document order. An ancestor compares equal to its descendants.
pub fn compare(a: &[usize], b: &[usize]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

pub fn common_ancestor(a: &[usize], b: &[usize]) -> Path {
    a.iter()
        .zip(b.iter())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| *x)
        .collect()
}
