//! Waypoint graphs of way objects.
//!
//! Points live in an arena and refer to each other by [`PointId`]. Links
//! are directed and stored on their source point. A removed point leaves
//! an empty slot so that outstanding ids never alias a different point.

use serde_derive::Serialize;
use strum::FromRepr;

use crate::{
    error::{Error, Result},
    format::Vector3f,
};

pub const MAIN_POINT_NAME: &str = "wp_00";

#[derive(Copy, Clone, Debug, Eq, PartialEq, FromRepr, Serialize)]
#[repr(u32)]
pub enum WayType {
    PatrolPath = 0,
    Jump = 1,
    Traffic = 2,
    Custom = 3,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct PointId(usize);

impl PointId {
    #[inline]
    pub fn index(self) -> usize { self.0 }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct WayLink {
    pub target: PointId,
    pub probability: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct WayPoint {
    pub name: String,
    pub position: Vector3f,
    pub flags: u32,
    pub selected: bool,
    pub links: Vec<WayLink>,
}

impl WayPoint {
    pub fn new(name: impl Into<String>, position: Vector3f) -> Self {
        Self { name: name.into(), position, flags: 0, selected: false, links: Vec::new() }
    }

    fn link_index(&self, target: PointId) -> Option<usize> {
        self.links.iter().position(|l| l.target == target)
    }
}

/// Link record as stored in way object bodies: point indices in file order.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinkRecord {
    pub from: u16,
    pub to: u16,
    pub probability: f32,
}

#[derive(Clone, Debug, Serialize)]
pub struct WayGraph {
    pub way_type: u32,
    points: Vec<Option<WayPoint>>,
    main: PointId,
}

impl Default for WayGraph {
    fn default() -> Self { Self::new() }
}

impl WayGraph {
    /// A graph holding only the main point at the origin.
    pub fn new() -> Self {
        Self {
            way_type: WayType::PatrolPath as u32,
            points: vec![Some(WayPoint::new(MAIN_POINT_NAME, Vector3f::ZERO))],
            main: PointId(0),
        }
    }

    /// Builds a graph from decoded points and links. The first point is
    /// the main point.
    pub fn from_records(
        way_type: u32,
        points: Vec<WayPoint>,
        links: &[LinkRecord],
    ) -> Result<Self> {
        if points.is_empty() {
            return Err(Error::malformed("way object without points"));
        }
        let points = points.into_iter().map(Some).collect();
        let mut graph = Self { way_type, points, main: PointId(0) };
        for link in links {
            let (from, to) = (PointId(link.from as usize), PointId(link.to as usize));
            if graph.point(from).is_none() || graph.point(to).is_none() {
                return Err(Error::malformed(format!(
                    "way link {}->{} outside {} points",
                    link.from,
                    link.to,
                    graph.points.len()
                )));
            }
            if from == to {
                log::warn!("Dropping self-link on way point {}", link.from);
                continue;
            }
            if !graph.add_link(from, to) {
                log::debug!("Dropping duplicate way link {}->{}", link.from, link.to);
                continue;
            }
            graph.set_probability(from, to, link.probability);
        }
        Ok(graph)
    }

    pub fn way_type(&self) -> Option<WayType> { WayType::from_repr(self.way_type) }

    #[inline]
    pub fn main(&self) -> PointId { self.main }

    pub fn point(&self, id: PointId) -> Option<&WayPoint> {
        self.points.get(id.0).and_then(Option::as_ref)
    }

    pub fn point_mut(&mut self, id: PointId) -> Option<&mut WayPoint> {
        self.points.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Live points in creation order.
    pub fn points(&self) -> impl Iterator<Item = (PointId, &WayPoint)> {
        self.points.iter().enumerate().filter_map(|(i, p)| p.as_ref().map(|p| (PointId(i), p)))
    }

    pub fn len(&self) -> usize { self.points().count() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Case-insensitive name lookup.
    pub fn find(&self, name: &str) -> Option<PointId> {
        self.points().find(|(_, p)| p.name.eq_ignore_ascii_case(name)).map(|(id, _)| id)
    }

    pub fn select(&mut self, id: PointId, selected: bool) {
        if let Some(p) = self.point_mut(id) {
            p.selected = selected;
        }
    }

    pub fn selected(&self) -> Vec<PointId> {
        self.points().filter(|(_, p)| p.selected).map(|(id, _)| id).collect()
    }

    fn unused_name(&self) -> String {
        (0..)
            .map(|i| format!("wp_{i:02}"))
            .find(|name| self.find(name).is_none())
            .unwrap_or_default()
    }

    /// Adds a point named `wp_NN` with the lowest free counter. With
    /// `auto_link`, the first selected point gets a link to it.
    pub fn create_point(&mut self, position: Vector3f, auto_link: bool) -> PointId {
        let source = self.selected().first().copied();
        let name = self.unused_name();
        let id = PointId(self.points.len());
        self.points.push(Some(WayPoint::new(name, position)));
        if auto_link {
            if let Some(source) = source {
                self.add_link(source, id);
            }
        }
        id
    }

    /// Removes selected points other than the main point, together with
    /// every link into them.
    pub fn remove_selected(&mut self) -> usize {
        let doomed: Vec<PointId> =
            self.selected().into_iter().filter(|&id| id != self.main).collect();
        for p in self.points.iter_mut().flatten() {
            p.links.retain(|l| !doomed.contains(&l.target));
        }
        for id in &doomed {
            self.points[id.0] = None;
        }
        doomed.len()
    }

    pub fn has_link(&self, from: PointId, to: PointId) -> bool {
        self.link_probability(from, to).is_some()
    }

    pub fn link_probability(&self, from: PointId, to: PointId) -> Option<f32> {
        let p = self.point(from)?;
        p.link_index(to).map(|i| p.links[i].probability)
    }

    fn set_probability(&mut self, from: PointId, to: PointId, probability: f32) {
        if let Some(p) = self.point_mut(from) {
            if let Some(i) = p.link_index(to) {
                p.links[i].probability = probability;
            }
        }
    }

    /// Removes the `from -> to` link, returning its probability.
    fn delete_link(&mut self, from: PointId, to: PointId) -> Option<f32> {
        let p = self.point_mut(from)?;
        let i = p.link_index(to)?;
        Some(p.links.remove(i).probability)
    }

    /// Adds a `from -> to` link. Returns false if it already exists or
    /// either end is missing.
    pub fn add_link(&mut self, from: PointId, to: PointId) -> bool {
        if from == to || self.point(to).is_none() || self.has_link(from, to) {
            return false;
        }
        match self.point_mut(from) {
            Some(p) => {
                p.links.push(WayLink { target: to, probability: 1.0 });
                true
            }
            None => false,
        }
    }

    pub fn add_double_link(&mut self, a: PointId, b: PointId) {
        self.add_link(a, b);
        self.add_link(b, a);
    }

    /// Removes links between `a` and `b` in both directions.
    pub fn remove_link(&mut self, a: PointId, b: PointId) {
        self.delete_link(a, b);
        self.delete_link(b, a);
    }

    /// Reverses a one-way link; swaps probabilities of a two-way link.
    pub fn invert_link(&mut self, a: PointId, b: PointId) {
        match (self.link_probability(a, b), self.link_probability(b, a)) {
            (Some(ab), Some(ba)) => {
                self.set_probability(a, b, ba);
                self.set_probability(b, a, ab);
            }
            (Some(ab), None) => {
                self.delete_link(a, b);
                self.add_link(b, a);
                self.set_probability(b, a, ab);
            }
            (None, Some(ba)) => {
                self.delete_link(b, a);
                self.add_link(a, b);
                self.set_probability(a, b, ba);
            }
            (None, None) => {}
        }
    }

    /// Leaves a single `a -> b` link if the points were connected.
    pub fn convert_1link(&mut self, a: PointId, b: PointId) {
        let ab = self.delete_link(a, b);
        let ba = self.delete_link(b, a);
        if let Some(probability) = ab.or(ba) {
            self.add_link(a, b);
            self.set_probability(a, b, probability);
        }
    }

    /// Makes a connection between `a` and `b` two-way.
    pub fn convert_2link(&mut self, a: PointId, b: PointId) {
        if self.has_link(a, b) || self.has_link(b, a) {
            self.add_double_link(a, b);
        }
    }

    /// Calls `f` for each unordered pair of selected points, in selection order.
    fn for_selected_pairs(&mut self, mut f: impl FnMut(&mut Self, PointId, PointId)) {
        let selected = self.selected();
        for (i, &a) in selected.iter().enumerate() {
            for &b in &selected[i + 1..] {
                f(self, a, b);
            }
        }
    }

    pub fn add_link_selected(&mut self) {
        self.for_selected_pairs(|g, a, b| {
            g.add_link(a, b);
        });
    }

    pub fn add_double_link_selected(&mut self) { self.for_selected_pairs(Self::add_double_link); }

    pub fn remove_link_selected(&mut self) {
        let selected = self.selected();
        for &a in &selected {
            for &b in &selected {
                if a != b {
                    self.remove_link(a, b);
                }
            }
        }
    }

    pub fn invert_link_selected(&mut self) { self.for_selected_pairs(Self::invert_link); }

    pub fn convert_1link_selected(&mut self) { self.for_selected_pairs(Self::convert_1link); }

    pub fn convert_2link_selected(&mut self) { self.for_selected_pairs(Self::convert_2link); }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with(n: usize) -> (WayGraph, Vec<PointId>) {
        let mut g = WayGraph::new();
        let mut ids = vec![g.main()];
        for i in 1..n {
            ids.push(g.create_point(Vector3f::new(i as f32, 0.0, 0.0), false));
        }
        (g, ids)
    }

    #[test]
    fn create_names_and_auto_link() {
        let (mut g, ids) = graph_with(3);
        let names: Vec<&str> = g.points().map(|(_, p)| p.name.as_str()).collect();
        assert_eq!(names, ["wp_00", "wp_01", "wp_02"]);

        g.select(ids[1], true);
        let p = g.create_point(Vector3f::ZERO, true);
        assert_eq!(g.point(p).unwrap().name, "wp_03");
        assert!(g.has_link(ids[1], p));
        assert!(!g.has_link(p, ids[1]));
    }

    #[test]
    fn names_reuse_gaps() {
        let (mut g, ids) = graph_with(4);
        g.select(ids[1], true);
        assert_eq!(g.remove_selected(), 1);
        let p = g.create_point(Vector3f::ZERO, false);
        assert_eq!(g.point(p).unwrap().name, "wp_01");
        assert!(g.point(ids[1]).is_none());
    }

    #[test]
    fn remove_keeps_main_and_drops_links() {
        let (mut g, ids) = graph_with(3);
        g.add_double_link(ids[0], ids[1]);
        g.add_link(ids[2], ids[1]);
        g.select(ids[0], true);
        g.select(ids[1], true);
        assert_eq!(g.remove_selected(), 1);
        assert!(g.point(g.main()).is_some());
        assert!(g.point(ids[0]).unwrap().links.is_empty());
        assert!(g.point(ids[2]).unwrap().links.is_empty());
        assert_eq!(g.len(), 2);
    }

    #[test]
    fn link_conversions() {
        let (mut g, ids) = graph_with(2);
        let (a, b) = (ids[0], ids[1]);
        assert!(g.add_link(b, a));
        assert!(!g.add_link(b, a));
        g.convert_1link(a, b);
        assert!(g.has_link(a, b) && !g.has_link(b, a));
        g.convert_2link(a, b);
        assert!(g.has_link(a, b) && g.has_link(b, a));
        g.remove_link(a, b);
        assert!(!g.has_link(a, b) && !g.has_link(b, a));
        g.convert_2link(a, b);
        assert!(!g.has_link(a, b));
    }

    #[test]
    fn invert_keeps_probability() {
        let (mut g, ids) = graph_with(2);
        let (a, b) = (ids[0], ids[1]);
        g.add_link(a, b);
        g.set_probability(a, b, 0.25);
        g.invert_link(a, b);
        assert!(!g.has_link(a, b));
        assert_eq!(g.link_probability(b, a), Some(0.25));
    }

    #[test]
    fn selected_pair_operations() {
        let (mut g, ids) = graph_with(4);
        for &id in &ids[1..] {
            g.select(id, true);
        }
        g.add_link_selected();
        assert!(g.has_link(ids[1], ids[2]));
        assert!(g.has_link(ids[1], ids[3]));
        assert!(g.has_link(ids[2], ids[3]));
        assert!(!g.has_link(ids[3], ids[1]));

        g.invert_link_selected();
        assert!(g.has_link(ids[3], ids[1]));
        assert!(!g.has_link(ids[1], ids[3]));

        g.add_double_link_selected();
        g.remove_link_selected();
        assert!(ids[1..].iter().all(|&id| g.point(id).unwrap().links.is_empty()));
    }

    #[test]
    fn from_records_validates_links() {
        let points =
            vec![WayPoint::new("wp_00", Vector3f::ZERO), WayPoint::new("wp_01", Vector3f::ZERO)];
        let links = [LinkRecord { from: 0, to: 1, probability: 0.5 }];
        let g = WayGraph::from_records(0, points.clone(), &links).unwrap();
        assert_eq!(g.link_probability(PointId(0), PointId(1)), Some(0.5));
        assert_eq!(g.way_type(), Some(WayType::PatrolPath));

        let bad = [LinkRecord { from: 0, to: 5, probability: 1.0 }];
        assert!(WayGraph::from_records(0, points, &bad).is_err());
        assert!(WayGraph::from_records(0, Vec::new(), &[]).is_err());
    }

    #[test]
    fn from_records_drops_self_and_duplicate_links() {
        let points =
            vec![WayPoint::new("wp_00", Vector3f::ZERO), WayPoint::new("wp_01", Vector3f::ZERO)];
        let links = [
            LinkRecord { from: 1, to: 1, probability: 0.9 },
            LinkRecord { from: 0, to: 1, probability: 0.5 },
            LinkRecord { from: 0, to: 1, probability: 0.2 },
        ];
        let g = WayGraph::from_records(0, points, &links).unwrap();
        assert!(!g.has_link(PointId(1), PointId(1)));
        assert!(g.point(PointId(1)).unwrap().links.is_empty());
        assert_eq!(g.point(PointId(0)).unwrap().links.len(), 1);
        assert_eq!(g.link_probability(PointId(0), PointId(1)), Some(0.5));
    }
}
