//! Virtual 2-D screen arrangement.
//!
//! A pure model with no I/O. All local and remote screens live in one shared
//! coordinate space with the primary local display normalised to (0, 0) and
//! Y growing downward. The arrangement answers which peer sits on a given
//! edge of the local displays and where a cursor leaving through that edge
//! enters the target screen.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use mouseshare_types::{DisplayBounds, Edge, PeerId};

/// Maximum gap (and minimum overlap) in virtual pixels for two screens to
/// count as adjacent.
pub const ADJACENCY_TOLERANCE: f64 = 50.0;

/// Stable identifier of a screen within the arrangement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenId(pub u32);

/// One screen placed in the shared virtual coordinate space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArrangedScreen {
    pub id: ScreenId,
    pub name: String,
    pub width: f64,
    pub height: f64,
    pub x: f64,
    pub y: f64,
    pub is_local: bool,
    /// OS display id for local screens.
    pub display_id: Option<u32>,
    /// Owning peer for remote screens. `None` while unresolved.
    pub peer_id: Option<PeerId>,
}

impl ArrangedScreen {
    fn right(&self) -> f64 {
        self.x + self.width
    }

    fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Ordered sequence of arranged screens plus the legacy explicit edge-link
/// table. Adjacency is authoritative; the table is a compatibility fallback.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenArrangement {
    screens: Vec<ArrangedScreen>,
    edge_links: HashMap<Edge, PeerId>,
    next_id: u32,
}

impl ScreenArrangement {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn screens(&self) -> &[ArrangedScreen] {
        &self.screens
    }

    fn allocate_id(&mut self) -> ScreenId {
        let id = ScreenId(self.next_id);
        self.next_id += 1;
        id
    }

    /// (Re)populate the local screens from the OS display list, normalising
    /// the primary display to (0, 0). Remote screens are untouched.
    pub fn initialize_local_displays(&mut self, displays: &[DisplayBounds]) {
        self.screens.retain(|s| !s.is_local);

        let (origin_x, origin_y) = displays
            .iter()
            .find(|d| d.is_primary)
            .or_else(|| displays.first())
            .map_or((0.0, 0.0), |d| (d.bounds.x, d.bounds.y));

        let mut seen = HashSet::new();
        for display in displays {
            // At most one local screen per physical display id.
            if !seen.insert(display.display_id) {
                continue;
            }
            let id = self.allocate_id();
            self.screens.push(ArrangedScreen {
                id,
                name: display.name.clone(),
                width: display.bounds.width,
                height: display.bounds.height,
                x: display.bounds.x - origin_x,
                y: display.bounds.y - origin_y,
                is_local: true,
                display_id: Some(display.display_id),
                peer_id: None,
            });
        }
    }

    /// Insert or update the screen for a connected peer, keyed first by peer
    /// id, then by name to tolerate transient id churn across restarts.
    pub fn update_remote_screen(&mut self, peer_id: PeerId, name: &str, width: f64, height: f64) {
        let idx = self
            .screens
            .iter()
            .position(|s| !s.is_local && s.peer_id == Some(peer_id))
            .or_else(|| {
                self.screens
                    .iter()
                    .position(|s| !s.is_local && s.name == name)
            });
        if let Some(screen) = idx.map(|i| &mut self.screens[i]) {
            screen.name = name.to_string();
            screen.width = width;
            screen.height = height;
            screen.peer_id = Some(peer_id);
            return;
        }

        // New remote screens land to the right of everything placed so far.
        let x = self
            .screens
            .iter()
            .map(ArrangedScreen::right)
            .fold(0.0, f64::max);
        let id = self.allocate_id();
        self.screens.push(ArrangedScreen {
            id,
            name: name.to_string(),
            width,
            height,
            x,
            y: 0.0,
            is_local: false,
            display_id: None,
            peer_id: Some(peer_id),
        });
    }

    /// Delete remote screens that are unresolved or whose peer has left the
    /// connected set.
    pub fn remove_stale_remote_screens(&mut self, connected: &HashSet<PeerId>) {
        self.screens
            .retain(|s| s.is_local || s.peer_id.is_some_and(|p| connected.contains(&p)));
    }

    /// Reposition a screen (user drag in the settings UI).
    pub fn update_position(&mut self, id: ScreenId, x: f64, y: f64) -> bool {
        match self.screens.iter_mut().find(|s| s.id == id) {
            Some(screen) => {
                screen.x = x;
                screen.y = y;
                true
            }
            None => false,
        }
    }

    /// The remote screen belonging to a peer, if placed.
    pub fn screen_for_peer(&self, peer_id: PeerId) -> Option<&ArrangedScreen> {
        self.screens
            .iter()
            .find(|s| !s.is_local && s.peer_id == Some(peer_id))
    }

    /// Which peer sits on the given edge of the local displays.
    ///
    /// The first local/remote adjacency in iteration order wins. When no
    /// adjacency matches, the explicit edge-link table is consulted.
    pub fn peer_for_edge(&self, edge: Edge) -> Option<PeerId> {
        self.route_for_edge(edge)
            .and_then(|(_, target)| target.peer_id)
            .or_else(|| self.edge_links.get(&edge).copied())
    }

    /// The (local, remote) screen pair realising an edge crossing, if an
    /// adjacency exists.
    pub fn route_for_edge(&self, edge: Edge) -> Option<(&ArrangedScreen, &ArrangedScreen)> {
        for local in self.screens.iter().filter(|s| s.is_local) {
            for remote in self
                .screens
                .iter()
                .filter(|s| !s.is_local && s.peer_id.is_some())
            {
                if adjacent(local, remote, edge) {
                    return Some((local, remote));
                }
            }
        }
        None
    }

    /// Record an explicit edge→peer link (legacy table, also used by
    /// auto-linking when a single peer is connected).
    pub fn link_edge(&mut self, edge: Edge, peer_id: PeerId) {
        self.edge_links.insert(edge, peer_id);
    }

    pub fn edge_link(&self, edge: Edge) -> Option<PeerId> {
        self.edge_links.get(&edge).copied()
    }

    pub fn has_edge_links(&self) -> bool {
        !self.edge_links.is_empty()
    }
}

/// Whether `remote` is adjacent to `local` on the given edge of `local`:
/// the gap along the edge's perpendicular axis is within tolerance and the
/// overlap along the parallel axis exceeds it.
fn adjacent(local: &ArrangedScreen, remote: &ArrangedScreen, edge: Edge) -> bool {
    let (gap, overlap) = match edge {
        Edge::Left => (
            (local.x - remote.right()).abs(),
            overlap_len(local.y, local.bottom(), remote.y, remote.bottom()),
        ),
        Edge::Right => (
            (remote.x - local.right()).abs(),
            overlap_len(local.y, local.bottom(), remote.y, remote.bottom()),
        ),
        Edge::Top => (
            (local.y - remote.bottom()).abs(),
            overlap_len(local.x, local.right(), remote.x, remote.right()),
        ),
        Edge::Bottom => (
            (remote.y - local.bottom()).abs(),
            overlap_len(local.x, local.right(), remote.x, remote.right()),
        ),
    };
    gap <= ADJACENCY_TOLERANCE && overlap > ADJACENCY_TOLERANCE
}

fn overlap_len(a_min: f64, a_max: f64, b_min: f64, b_max: f64) -> f64 {
    (a_max.min(b_max) - a_min.max(b_min)).max(0.0)
}

/// Map a normalised exit position on `source` to the normalised entry
/// position on `target` for a crossing through `edge`.
///
/// The shared axis is Y for left/right crossings and X for top/bottom; both
/// use the proper parallel-axis coordinate. The exit point is projected into
/// virtual space and clamped to the overlap region between the two screens.
/// Disjoint screens map to the centre of the target edge.
#[must_use]
pub fn compute_entry_position(
    exit_point: f64,
    source: &ArrangedScreen,
    target: &ArrangedScreen,
    edge: Edge,
) -> f64 {
    let (source_origin, source_extent, target_origin, target_extent) = if edge.is_vertical() {
        (source.y, source.height, target.y, target.height)
    } else {
        (source.x, source.width, target.x, target.width)
    };

    let overlap_min = source_origin.max(target_origin);
    let overlap_max = (source_origin + source_extent).min(target_origin + target_extent);
    if overlap_max <= overlap_min || target_extent <= 0.0 {
        return 0.5;
    }

    let exit_virtual = source_origin + exit_point.clamp(0.0, 1.0) * source_extent;
    let clamped = exit_virtual.clamp(overlap_min, overlap_max);
    (clamped - target_origin) / target_extent
}

#[cfg(test)]
mod tests {
    use super::*;
    use mouseshare_types::Rect;

    fn display(id: u32, name: &str, x: f64, y: f64, w: f64, h: f64, primary: bool) -> DisplayBounds {
        DisplayBounds {
            display_id: id,
            name: name.to_string(),
            bounds: Rect::new(x, y, w, h),
            is_primary: primary,
        }
    }

    fn local(id: u32, x: f64, y: f64, w: f64, h: f64) -> ArrangedScreen {
        ArrangedScreen {
            id: ScreenId(id),
            name: format!("display-{id}"),
            width: w,
            height: h,
            x,
            y,
            is_local: true,
            display_id: Some(id),
            peer_id: None,
        }
    }

    fn remote(id: u32, peer: PeerId, x: f64, y: f64, w: f64, h: f64) -> ArrangedScreen {
        ArrangedScreen {
            id: ScreenId(id),
            name: format!("peer-{id}"),
            width: w,
            height: h,
            x,
            y,
            is_local: false,
            display_id: None,
            peer_id: Some(peer),
        }
    }

    fn arrangement_with(screens: Vec<ArrangedScreen>) -> ScreenArrangement {
        let next_id = screens.iter().map(|s| s.id.0 + 1).max().unwrap_or(0);
        ScreenArrangement {
            screens,
            edge_links: HashMap::new(),
            next_id,
        }
    }

    #[test]
    fn primary_display_is_normalised_to_origin() {
        let mut arrangement = ScreenArrangement::new();
        arrangement.initialize_local_displays(&[
            display(7, "built-in", 100.0, 50.0, 1920.0, 1080.0, true),
            display(8, "external", 2020.0, 50.0, 2560.0, 1440.0, false),
        ]);

        let screens = arrangement.screens();
        assert_eq!(screens.len(), 2);
        assert_eq!((screens[0].x, screens[0].y), (0.0, 0.0));
        assert_eq!((screens[1].x, screens[1].y), (1920.0, 0.0));
    }

    #[test]
    fn duplicate_display_ids_collapse() {
        let main = display(1, "main", 0.0, 0.0, 1920.0, 1080.0, true);
        let mut arrangement = ScreenArrangement::new();
        arrangement.initialize_local_displays(&[main.clone(), main]);
        assert_eq!(arrangement.screens().len(), 1);
    }

    #[test]
    fn peer_on_left_edge_is_found() {
        let peer = PeerId::new();
        let arrangement = arrangement_with(vec![
            local(0, 0.0, 0.0, 1920.0, 1080.0),
            remote(1, peer, -1920.0, 0.0, 1920.0, 1080.0),
        ]);
        assert_eq!(arrangement.peer_for_edge(Edge::Left), Some(peer));
        assert_eq!(arrangement.peer_for_edge(Edge::Right), None);
    }

    #[test]
    fn first_adjacency_in_order_wins() {
        let first = PeerId::new();
        let second = PeerId::new();
        let arrangement = arrangement_with(vec![
            local(0, 0.0, 0.0, 1920.0, 1080.0),
            remote(1, first, 1920.0, 0.0, 1920.0, 540.0),
            remote(2, second, 1920.0, 540.0, 1920.0, 540.0),
        ]);
        assert_eq!(arrangement.peer_for_edge(Edge::Right), Some(first));
    }

    #[test]
    fn gap_beyond_tolerance_is_not_adjacent() {
        let peer = PeerId::new();
        let arrangement = arrangement_with(vec![
            local(0, 0.0, 0.0, 1920.0, 1080.0),
            remote(1, peer, 1920.0 + ADJACENCY_TOLERANCE + 1.0, 0.0, 1920.0, 1080.0),
        ]);
        assert_eq!(arrangement.peer_for_edge(Edge::Right), None);
    }

    #[test]
    fn sliver_overlap_is_not_adjacent() {
        let peer = PeerId::new();
        // Only 40 px of vertical overlap: below tolerance.
        let arrangement = arrangement_with(vec![
            local(0, 0.0, 0.0, 1920.0, 1080.0),
            remote(1, peer, 1920.0, 1040.0, 1920.0, 1080.0),
        ]);
        assert_eq!(arrangement.peer_for_edge(Edge::Right), None);
    }

    #[test]
    fn edge_link_is_fallback_only() {
        let adjacent_peer = PeerId::new();
        let linked_peer = PeerId::new();
        let mut arrangement = arrangement_with(vec![
            local(0, 0.0, 0.0, 1920.0, 1080.0),
            remote(1, adjacent_peer, 1920.0, 0.0, 1920.0, 1080.0),
        ]);
        arrangement.link_edge(Edge::Right, linked_peer);
        arrangement.link_edge(Edge::Left, linked_peer);

        // Adjacency beats the table; the table answers where no adjacency is.
        assert_eq!(arrangement.peer_for_edge(Edge::Right), Some(adjacent_peer));
        assert_eq!(arrangement.peer_for_edge(Edge::Left), Some(linked_peer));
    }

    #[test]
    fn entry_position_identical_screens_is_identity() {
        let a = local(0, 0.0, 0.0, 1920.0, 1080.0);
        let b = remote(1, PeerId::new(), 1920.0, 0.0, 1920.0, 1080.0);
        for exit in [0.0, 0.25, 0.5, 1.0] {
            let entry = compute_entry_position(exit, &a, &b, Edge::Right);
            assert!((entry - exit).abs() < 1e-9);
        }
    }

    #[test]
    fn entry_position_clamps_to_overlap() {
        let a = local(0, 0.0, 0.0, 1920.0, 1080.0);
        // Target is offset downward: only the lower half of `a` overlaps.
        let b = remote(1, PeerId::new(), 1920.0, 540.0, 1920.0, 1080.0);

        // Exit above the overlap clamps to the target's top.
        assert_eq!(compute_entry_position(0.0, &a, &b, Edge::Right), 0.0);
        // Exit at the very bottom of `a` lands half-way down the target.
        let entry = compute_entry_position(1.0, &a, &b, Edge::Right);
        assert!((entry - 0.5).abs() < 1e-9);
    }

    #[test]
    fn entry_position_is_always_in_unit_range() {
        let a = local(0, 0.0, -3000.0, 800.0, 600.0);
        let b = remote(1, PeerId::new(), 800.0, -2800.0, 2560.0, 1440.0);
        for i in 0..=20 {
            let exit = f64::from(i) / 20.0;
            for edge in [Edge::Left, Edge::Right, Edge::Top, Edge::Bottom] {
                let entry = compute_entry_position(exit, &a, &b, edge);
                assert!((0.0..=1.0).contains(&entry), "entry {entry} out of range");
            }
        }
    }

    #[test]
    fn disjoint_screens_map_to_centre() {
        let a = local(0, 0.0, 0.0, 1920.0, 1080.0);
        let b = remote(1, PeerId::new(), 1920.0, 5000.0, 1920.0, 1080.0);
        assert_eq!(compute_entry_position(0.3, &a, &b, Edge::Right), 0.5);
    }

    #[test]
    fn top_crossing_uses_horizontal_coordinate() {
        let a = local(0, 0.0, 0.0, 1920.0, 1080.0);
        let b = remote(1, PeerId::new(), 480.0, -1080.0, 960.0, 1080.0);
        // Exit at x = 0.5 · 1920 = 960 which is the centre of the target.
        let entry = compute_entry_position(0.5, &a, &b, Edge::Top);
        assert!((entry - 0.5).abs() < 1e-9);
        // Exit left of the target's span clamps to its left edge.
        assert_eq!(compute_entry_position(0.0, &a, &b, Edge::Top), 0.0);
    }

    #[test]
    fn update_remote_screen_rekeys_by_name() {
        let old_id = PeerId::new();
        let new_id = PeerId::new();
        let mut arrangement = arrangement_with(vec![local(0, 0.0, 0.0, 1920.0, 1080.0)]);
        arrangement.update_remote_screen(old_id, "laptop", 1440.0, 900.0);
        // Same name, new peer id after a restart: the screen is reused.
        arrangement.update_remote_screen(new_id, "laptop", 1440.0, 900.0);

        let remotes: Vec<_> = arrangement.screens().iter().filter(|s| !s.is_local).collect();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].peer_id, Some(new_id));
    }

    #[test]
    fn stale_remotes_are_removed() {
        let kept = PeerId::new();
        let dropped = PeerId::new();
        let mut arrangement = arrangement_with(vec![local(0, 0.0, 0.0, 1920.0, 1080.0)]);
        arrangement.update_remote_screen(kept, "kept", 1920.0, 1080.0);
        arrangement.update_remote_screen(dropped, "dropped", 1920.0, 1080.0);

        let connected: HashSet<PeerId> = [kept].into_iter().collect();
        arrangement.remove_stale_remote_screens(&connected);

        let remotes: Vec<_> = arrangement.screens().iter().filter(|s| !s.is_local).collect();
        assert_eq!(remotes.len(), 1);
        assert_eq!(remotes[0].peer_id, Some(kept));
    }

    #[test]
    fn update_position_moves_screen() {
        let peer = PeerId::new();
        let mut arrangement = arrangement_with(vec![local(0, 0.0, 0.0, 1920.0, 1080.0)]);
        arrangement.update_remote_screen(peer, "laptop", 1440.0, 900.0);
        let id = arrangement.screen_for_peer(peer).unwrap().id;

        assert!(arrangement.update_position(id, -1440.0, 90.0));
        let screen = arrangement.screen_for_peer(peer).unwrap();
        assert_eq!((screen.x, screen.y), (-1440.0, 90.0));
        assert_eq!(arrangement.peer_for_edge(Edge::Left), Some(peer));
    }

    #[test]
    fn arrangement_serialises_for_persistence() {
        let peer = PeerId::new();
        let mut arrangement = ScreenArrangement::new();
        arrangement.initialize_local_displays(&[display(1, "main", 0.0, 0.0, 1920.0, 1080.0, true)]);
        arrangement.update_remote_screen(peer, "laptop", 1440.0, 900.0);
        arrangement.link_edge(Edge::Right, peer);

        let json = serde_json::to_string(&arrangement).unwrap();
        let restored: ScreenArrangement = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.screens(), arrangement.screens());
        assert_eq!(restored.edge_link(Edge::Right), Some(peer));
    }
}
