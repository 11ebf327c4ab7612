//! Grouping model: which pages of the sequence are fused into one document
//!
//! A [`Partition`] splits the page numbers `1..=N` into ordered groups, every
//! page in exactly one group. [`GroupingModel`] edits a partition through two
//! operations: toggling the boundary between two adjacent pages, and
//! replacing the whole partition from a set of split points. Both validate
//! their input before touching the partition, so a rejected edit leaves the
//! model unchanged.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Members of one group, kept in insertion order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Group(Vec<u32>);

impl Group {
    fn new(members: Vec<u32>) -> Self {
        Self(members)
    }

    fn singleton(page: u32) -> Self {
        Self(vec![page])
    }

    pub fn members(&self) -> &[u32] {
        &self.0
    }

    /// Members in the order their pages are assembled
    pub fn sorted_members(&self) -> Vec<u32> {
        let mut members = self.0.clone();
        members.sort_unstable();
        members
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A group holding a single page is not grouped with anything
    pub fn is_trivial(&self) -> bool {
        self.0.len() == 1
    }

    pub fn contains(&self, page: u32) -> bool {
        self.0.contains(&page)
    }

    /// Lowest and highest member
    pub fn span(&self) -> Option<(u32, u32)> {
        let first = *self.0.iter().min()?;
        let last = *self.0.iter().max()?;
        Some((first, last))
    }

    /// Members form one run with no gaps
    pub fn is_contiguous(&self) -> bool {
        match self.span() {
            Some((first, last)) => (last - first + 1) as usize == self.0.len(),
            None => true,
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let members = self.sorted_members();
        match (self.is_contiguous(), self.span()) {
            (true, Some((first, last))) if first == last => write!(f, "[{}]", first),
            (true, Some((first, last))) => write!(f, "[{}-{}]", first, last),
            _ => {
                let list: Vec<String> = members.iter().map(u32::to_string).collect();
                write!(f, "[{}]", list.join(","))
            }
        }
    }
}

/// Inclusive page range `start..=end`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRange {
    pub start: u32,
    pub end: u32,
}

impl PageRange {
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// Check `1 <= start <= end <= page_count`
    pub fn validate(&self, page_count: u32) -> Result<()> {
        if self.start == 0 || self.start > page_count {
            return Err(Error::InvalidPageNumber {
                page: self.start,
                page_count,
            });
        }
        if self.end > page_count {
            return Err(Error::InvalidPageNumber {
                page: self.end,
                page_count,
            });
        }
        if self.start > self.end {
            return Err(Error::InvalidRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }

    pub fn pages(&self) -> impl Iterator<Item = u32> {
        self.start..=self.end
    }
}

impl FromStr for PageRange {
    type Err = Error;

    /// `"3"` or `"3-5"`
    fn from_str(s: &str) -> Result<Self> {
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|_| Error::General(format!("Invalid page range: {}", s)))
        };
        match s.split_once('-') {
            Some((start, end)) => Ok(Self::new(parse(start)?, parse(end)?)),
            None => {
                let page = parse(s)?;
                Ok(Self::new(page, page))
            }
        }
    }
}

/// Ordered groups covering `1..=page_count`, each page exactly once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    page_count: u32,
    groups: Vec<Group>,
}

impl Partition {
    /// Every page in its own group
    pub fn identity(page_count: u32) -> Self {
        Self {
            page_count,
            groups: (1..=page_count).map(Group::singleton).collect(),
        }
    }

    /// Build from explicit membership lists. Empty lists are ignored; the
    /// rest must cover every page exactly once.
    pub fn from_groups(page_count: u32, groups: &[Vec<u32>]) -> Result<Self> {
        let mut seen = vec![false; page_count as usize];
        let mut kept = Vec::new();

        for members in groups.iter().filter(|members| !members.is_empty()) {
            for &page in members {
                if page == 0 || page > page_count {
                    return Err(Error::InvalidPageNumber { page, page_count });
                }
                let slot = &mut seen[(page - 1) as usize];
                if *slot {
                    return Err(Error::DuplicatePage(page));
                }
                *slot = true;
            }
            kept.push(Group::new(members.clone()));
        }

        let missing: Vec<u32> = seen
            .iter()
            .enumerate()
            .filter(|(_, &covered)| !covered)
            .map(|(index, _)| index as u32 + 1)
            .collect();
        if !missing.is_empty() {
            return Err(Error::IncompletePartition { missing });
        }

        Ok(Self {
            page_count,
            groups: kept,
        })
    }

    /// Contiguous groups ending at each split point: sorted points
    /// `s1 < .. < sk` give `[1..=s1], [s1+1..=s2], .., [sk+1..=N]`.
    ///
    /// A point at `N` closes the last group and adds nothing after it.
    pub fn from_split_points(page_count: u32, points: &BTreeSet<u32>) -> Result<Self> {
        if let Some(&page) = points.iter().find(|&&p| p == 0 || p > page_count) {
            return Err(Error::InvalidPageNumber { page, page_count });
        }

        let mut groups = Vec::with_capacity(points.len() + 1);
        let mut start = 1;
        for &point in points {
            groups.push(Group::new((start..=point).collect()));
            start = point + 1;
        }
        if start <= page_count {
            groups.push(Group::new((start..=page_count).collect()));
        }

        Ok(Self { page_count, groups })
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Membership lists, as accepted by [`Partition::from_groups`]
    pub fn to_lists(&self) -> Vec<Vec<u32>> {
        self.groups.iter().map(|group| group.0.clone()).collect()
    }

    /// Position of the group holding `page`
    pub fn group_of(&self, page: u32) -> Option<usize> {
        self.groups.iter().position(|group| group.contains(page))
    }

    /// Inclusive ranges, when every group is contiguous
    pub fn ranges(&self) -> Option<Vec<PageRange>> {
        self.groups
            .iter()
            .map(|group| {
                let (start, end) = group.span()?;
                group.is_contiguous().then_some(PageRange::new(start, end))
            })
            .collect()
    }

    /// Check the partition invariant: no empty group, every page of
    /// `1..=page_count` exactly once.
    pub fn check(&self) -> Result<()> {
        if self.groups.iter().any(Group::is_empty) {
            return Err(Error::General("partition holds an empty group".to_string()));
        }
        Self::from_groups(self.page_count, &self.to_lists()).map(|_| ())
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self.groups.iter().map(Group::to_string).collect();
        write!(f, "{}", groups.join(" "))
    }
}

/// Which rule a boundary toggle applies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleCase {
    /// Both pages share a group: cut it apart around the boundary
    Split,
    /// Two multi-page groups: fuse them at the first group's position
    Merge,
    /// One side is a lone page: it joins the other side's group in place
    Absorb,
    /// Two lone pages: they become a new two-page group
    Pair,
}

impl ToggleCase {
    /// Exhaustive over `(same group, first trivial, second trivial)`
    pub fn classify(same_group: bool, first_trivial: bool, second_trivial: bool) -> Self {
        match (same_group, first_trivial, second_trivial) {
            (true, _, _) => ToggleCase::Split,
            (false, false, false) => ToggleCase::Merge,
            (false, true, false) | (false, false, true) => ToggleCase::Absorb,
            (false, true, true) => ToggleCase::Pair,
        }
    }
}

/// Editable grouping over the pages of one editing session
#[derive(Debug, Clone)]
pub struct GroupingModel {
    partition: Partition,
}

impl GroupingModel {
    /// Start with every page on its own
    pub fn new(page_count: u32) -> Self {
        Self {
            partition: Partition::identity(page_count),
        }
    }

    pub fn page_count(&self) -> u32 {
        self.partition.page_count
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    /// Toggle the boundary between page `page` and page `page + 1`.
    ///
    /// - same group: the group falls apart into the members below `page`,
    ///   `{page}`, `{page + 1}` and the members above `page + 1`, dropping
    ///   empty pieces. Toggling again does not restore a group of three or
    ///   more pages.
    /// - different groups: the two groups fuse, members sorted ascending.
    ///   A lone page is absorbed into the other side's group where that
    ///   group stands; otherwise the result takes the first group's place.
    pub fn toggle_adjacent_grouping(&mut self, page: u32) -> Result<ToggleCase> {
        let page_count = self.page_count();
        if page == 0 || page >= page_count {
            return Err(Error::InvalidPageNumber { page, page_count });
        }

        let first = self.partition.group_of(page).ok_or(Error::UngroupedPage(page))?;
        let second = self
            .partition
            .group_of(page + 1)
            .ok_or(Error::UngroupedPage(page + 1))?;

        let groups = &self.partition.groups;
        let case = ToggleCase::classify(
            first == second,
            groups[first].is_trivial(),
            groups[second].is_trivial(),
        );

        let mut next = groups.clone();
        match case {
            ToggleCase::Split => {
                let members = &groups[first].0;
                let below: Vec<u32> = members.iter().copied().filter(|&m| m < page).collect();
                let above: Vec<u32> = members.iter().copied().filter(|&m| m > page + 1).collect();

                let pieces: Vec<Group> = [below, vec![page], vec![page + 1], above]
                    .into_iter()
                    .filter(|piece| !piece.is_empty())
                    .map(Group::new)
                    .collect();
                next.splice(first..=first, pieces);
            }
            ToggleCase::Merge | ToggleCase::Pair => fuse(&mut next, first, second),
            ToggleCase::Absorb => {
                if groups[first].is_trivial() {
                    fuse(&mut next, second, first)
                } else {
                    fuse(&mut next, first, second)
                }
            }
        }

        debug!(page, ?case, "toggled page boundary");
        self.partition.groups = next;
        Ok(case)
    }

    /// Replace the partition with contiguous groups ending at `points`.
    /// No points gives one group holding every page.
    pub fn set_explicit_split_points<I>(&mut self, points: I) -> Result<()>
    where
        I: IntoIterator<Item = u32>,
    {
        let points: BTreeSet<u32> = points.into_iter().collect();
        self.partition = Partition::from_split_points(self.page_count(), &points)?;
        debug!(?points, "applied split points");
        Ok(())
    }

    /// Replace the partition with explicit membership lists
    pub fn set_groups(&mut self, groups: &[Vec<u32>]) -> Result<()> {
        self.partition = Partition::from_groups(self.page_count(), groups)?;
        Ok(())
    }

    /// Back to one group per page
    pub fn reset(&mut self) {
        self.partition = Partition::identity(self.page_count());
    }
}

/// Put the sorted union of `groups[keep]` and `groups[drop]` at `keep`
/// and remove `drop`.
fn fuse(groups: &mut Vec<Group>, keep: usize, drop: usize) {
    let mut members = groups[keep].0.clone();
    members.extend_from_slice(&groups[drop].0);
    members.sort_unstable();
    groups[keep] = Group::new(members);
    groups.remove(drop);
}
