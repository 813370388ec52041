use std::collections::BTreeSet;
use std::fmt;
use crate::utils::config::Upstream;

/// Ordered ASNs of a route, origin last.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct AsPath(pub Vec<String>);

impl AsPath {
    pub fn new<I, S>(asns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(asns.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn origin(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Every ASN in front of the origin.
    pub fn upstreams(&self) -> &[String] {
        match self.0.split_last() {
            Some((_, rest)) => rest,
            None => &[],
        }
    }

    pub fn has_upstream(&self, asn: &str) -> bool {
        self.upstreams().iter().any(|a| a == asn)
    }
}

impl fmt::Display for AsPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Announce,
    Withdraw,
    Other,
}

impl EventKind {
    /// Classifies the BGPlay event type field (`A`, `W`, `announce`, `withdrawal`, ...).
    pub fn classify(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        if lowered.contains("announce") || lowered == "a" {
            EventKind::Announce
        } else if lowered.contains("withdraw") || lowered == "w" {
            EventKind::Withdraw
        } else {
            EventKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEvent {
    pub timestamp: i64,
    pub kind: EventKind,
    pub path: AsPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SamplingMode {
    /// Check every second of the window.
    EverySecond,
    /// Check the window start and the instants around each event.
    #[default]
    EventDriven,
}

/// Whether a watched upstream was seen in front of the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamPresence {
    pub upstream: Upstream,
    pub present: bool,
}

impl UpstreamPresence {
    pub fn yes_no(&self) -> &'static str {
        if self.present { "Yes" } else { "No" }
    }
}

/// Rebuilds the set of active paths at arbitrary instants from an initial
/// state plus announce/withdraw events.
#[derive(Debug, Clone)]
pub struct Replayer {
    initial: Vec<AsPath>,
    events: Vec<RouteEvent>,
}

impl Replayer {
    pub fn new(initial: Vec<AsPath>, mut events: Vec<RouteEvent>) -> Self {
        // stable: equal timestamps keep their feed order
        events.sort_by_key(|e| e.timestamp);
        Self {
            initial: initial.into_iter().filter(|p| !p.is_empty()).collect(),
            events,
        }
    }

    pub fn events(&self) -> &[RouteEvent] {
        &self.events
    }

    /// Paths active at `ts`, after applying every event with `timestamp <= ts`.
    pub fn active_at(&self, ts: i64) -> Vec<AsPath> {
        let mut cursor = self.cursor();
        cursor.advance_to(ts);
        cursor.active
    }

    pub fn cursor(&self) -> ReplayCursor<'_> {
        ReplayCursor {
            events: &self.events,
            next: 0,
            active: self.initial.clone(),
        }
    }

    /// Scans `[start, end]` and reports, per watched upstream, whether it was
    /// ever in front of `origin` at a sampled instant.
    pub fn scan_window(
        &self,
        start: i64,
        end: i64,
        origin: &str,
        watched: &[Upstream],
        mode: SamplingMode,
    ) -> Vec<UpstreamPresence> {
        let mut seen = vec![false; watched.len()];
        if start > end {
            return to_presence(watched, &seen);
        }

        let samples: Box<dyn Iterator<Item = i64>> = match mode {
            SamplingMode::EverySecond => Box::new(start..=end),
            SamplingMode::EventDriven => Box::new(self.event_samples(start, end).into_iter()),
        };

        let mut cursor = self.cursor();
        for ts in samples {
            cursor.advance_to(ts);
            let origin_paths = origin_paths(cursor.active(), origin);
            for (flag, upstream) in seen.iter_mut().zip(watched) {
                if !*flag && origin_paths.iter().any(|p| p.has_upstream(&upstream.asn)) {
                    *flag = true;
                }
            }
            if seen.iter().all(|s| *s) {
                log::debug!("All watched upstreams seen by {}, stopping scan early", ts);
                break;
            }
        }

        to_presence(watched, &seen)
    }

    /// Window start plus `ts-1, ts, ts+1` for every event up to `end`, clipped to the window.
    pub fn event_samples(&self, start: i64, end: i64) -> Vec<i64> {
        let mut samples = BTreeSet::new();
        samples.insert(start);
        for event in self.events.iter().take_while(|e| e.timestamp <= end) {
            for ts in [event.timestamp.saturating_sub(1), event.timestamp, event.timestamp.saturating_add(1)] {
                if ts >= start && ts <= end {
                    samples.insert(ts);
                }
            }
        }
        samples.into_iter().collect()
    }
}

/// Incremental replay position. Only moves forward in time.
#[derive(Debug, Clone)]
pub struct ReplayCursor<'a> {
    events: &'a [RouteEvent],
    next: usize,
    active: Vec<AsPath>,
}

impl<'a> ReplayCursor<'a> {
    pub fn advance_to(&mut self, ts: i64) {
        while let Some(event) = self.events.get(self.next) {
            if event.timestamp > ts {
                break;
            }
            self.next += 1;
            if event.path.is_empty() {
                continue;
            }
            match event.kind {
                EventKind::Announce => self.active.push(event.path.clone()),
                EventKind::Withdraw => {
                    if let Some(pos) = self.active.iter().position(|p| *p == event.path) {
                        self.active.remove(pos);
                    }
                }
                EventKind::Other => {}
            }
        }
    }

    pub fn active(&self) -> &[AsPath] {
        &self.active
    }
}

pub fn origin_paths<'p>(active: &'p [AsPath], origin: &str) -> Vec<&'p AsPath> {
    active.iter().filter(|p| p.origin() == Some(origin)).collect()
}

pub fn upstream_presence(origin_paths: &[&AsPath], watched: &[Upstream]) -> Vec<UpstreamPresence> {
    watched
        .iter()
        .map(|u| UpstreamPresence {
            upstream: u.clone(),
            present: origin_paths.iter().any(|p| p.has_upstream(&u.asn)),
        })
        .collect()
}

/// Sorted, de-duplicated upstream ASNs across the given paths.
pub fn unique_upstreams(paths: &[&AsPath]) -> Vec<String> {
    paths
        .iter()
        .flat_map(|p| p.upstreams().iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn to_presence(watched: &[Upstream], seen: &[bool]) -> Vec<UpstreamPresence> {
    watched
        .iter()
        .zip(seen)
        .map(|(u, s)| UpstreamPresence { upstream: u.clone(), present: *s })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const ORIGIN: &str = "329001";

    fn path(asns: &[&str]) -> AsPath {
        AsPath::new(asns.iter().copied())
    }

    fn event(ts: i64, kind: EventKind, asns: &[&str]) -> RouteEvent {
        RouteEvent { timestamp: ts, kind, path: path(asns) }
    }

    fn watched() -> Vec<Upstream> {
        vec![
            Upstream { name: "GLO".into(), asn: "37148".into() },
            Upstream { name: "Dolphin".into(), asn: "37613".into() },
        ]
    }

    fn sample_replayer() -> Replayer {
        Replayer::new(
            vec![path(&["3356", "37148", ORIGIN]), path(&[])],
            vec![
                // deliberately out of order
                event(200, EventKind::Withdraw, &["3356", "37148", ORIGIN]),
                event(100, EventKind::Announce, &["1299", "37613", ORIGIN]),
                event(300, EventKind::Announce, &["174", "37148", ORIGIN]),
                event(150, EventKind::Other, &["64500", ORIGIN]),
            ],
        )
    }

    #[test]
    fn classifies_event_types() {
        assert_eq!(EventKind::classify("A"), EventKind::Announce);
        assert_eq!(EventKind::classify("announcement"), EventKind::Announce);
        assert_eq!(EventKind::classify("W"), EventKind::Withdraw);
        assert_eq!(EventKind::classify("withdrawal"), EventKind::Withdraw);
        assert_eq!(EventKind::classify("S"), EventKind::Other);
    }

    #[test]
    fn upstreams_exclude_origin() {
        let p = path(&["3356", "37148", ORIGIN]);
        assert_eq!(p.origin(), Some(ORIGIN));
        assert_eq!(p.upstreams(), &["3356".to_string(), "37148".to_string()]);
        assert!(!p.has_upstream(ORIGIN));
        assert!(path(&[]).upstreams().is_empty());
    }

    #[test]
    fn replays_events_up_to_instant() {
        let replay = sample_replayer();

        assert_eq!(replay.active_at(99), vec![path(&["3356", "37148", ORIGIN])]);
        assert_eq!(
            replay.active_at(100),
            vec![path(&["3356", "37148", ORIGIN]), path(&["1299", "37613", ORIGIN])]
        );
        assert_eq!(replay.active_at(250), vec![path(&["1299", "37613", ORIGIN])]);
        assert_eq!(
            replay.active_at(i64::MAX),
            vec![path(&["1299", "37613", ORIGIN]), path(&["174", "37148", ORIGIN])]
        );
    }

    #[test]
    fn withdraw_of_unknown_path_is_ignored() {
        let replay = Replayer::new(
            vec![path(&["1", ORIGIN])],
            vec![event(10, EventKind::Withdraw, &["2", ORIGIN]), event(11, EventKind::Withdraw, &[])],
        );
        assert_eq!(replay.active_at(20), vec![path(&["1", ORIGIN])]);
    }

    #[test]
    fn withdraw_removes_one_duplicate() {
        let replay = Replayer::new(
            vec![],
            vec![
                event(1, EventKind::Announce, &["1", ORIGIN]),
                event(2, EventKind::Announce, &["1", ORIGIN]),
                event(3, EventKind::Withdraw, &["1", ORIGIN]),
            ],
        );
        assert_eq!(replay.active_at(3), vec![path(&["1", ORIGIN])]);
    }

    #[test]
    fn equal_timestamps_apply_in_feed_order() {
        let replay = Replayer::new(
            vec![],
            vec![
                event(5, EventKind::Announce, &["1", ORIGIN]),
                event(5, EventKind::Withdraw, &["1", ORIGIN]),
            ],
        );
        assert!(replay.active_at(5).is_empty());
    }

    #[test]
    fn origin_filter_and_unique_upstreams() {
        let active = vec![
            path(&["3356", "37148", ORIGIN]),
            path(&["1299", "37148", ORIGIN]),
            path(&["37148", "64500"]),
        ];
        let mine = origin_paths(&active, ORIGIN);
        assert_eq!(mine.len(), 2);
        assert_eq!(unique_upstreams(&mine), vec!["1299", "3356", "37148"]);

        let presence = upstream_presence(&mine, &watched());
        assert_eq!(presence.iter().map(|p| p.present).collect::<Vec<_>>(), vec![true, false]);
        assert_eq!(presence[1].yes_no(), "No");
    }

    #[test]
    fn event_samples_are_clipped_to_window() {
        let replay = sample_replayer();
        assert_eq!(replay.event_samples(100, 200), vec![100, 101, 149, 150, 151, 199, 200]);
    }

    #[test]
    fn sampling_modes_agree() {
        let replay = sample_replayer();
        for (start, end) in [(0, 50), (0, 99), (0, 150), (201, 299), (201, 400), (250, 260)] {
            let exhaustive = replay.scan_window(start, end, ORIGIN, &watched(), SamplingMode::EverySecond);
            let driven = replay.scan_window(start, end, ORIGIN, &watched(), SamplingMode::EventDriven);
            assert_eq!(exhaustive, driven, "window {}..={}", start, end);
        }
    }

    #[test]
    fn scan_reports_presence_anywhere_in_window() {
        let replay = sample_replayer();

        let before = replay.scan_window(0, 99, ORIGIN, &watched(), SamplingMode::EventDriven);
        assert_eq!(before.iter().map(|p| p.present).collect::<Vec<_>>(), vec![true, false]);

        let middle = replay.scan_window(201, 299, ORIGIN, &watched(), SamplingMode::EventDriven);
        assert_eq!(middle.iter().map(|p| p.present).collect::<Vec<_>>(), vec![false, true]);

        let whole = replay.scan_window(0, 400, ORIGIN, &watched(), SamplingMode::EventDriven);
        assert!(whole.iter().all(|p| p.present));
    }

    #[test]
    fn extreme_timestamps_do_not_overflow_sampling() {
        let replay = Replayer::new(
            vec![],
            vec![
                event(i64::MIN, EventKind::Announce, &["37148", ORIGIN]),
                event(i64::MAX, EventKind::Announce, &["37613", ORIGIN]),
            ],
        );
        assert_eq!(replay.event_samples(i64::MIN, i64::MAX), vec![i64::MIN, i64::MIN + 1, i64::MAX - 1, i64::MAX]);

        let seen = replay.scan_window(0, 86_399, ORIGIN, &watched(), SamplingMode::EventDriven);
        assert_eq!(seen.iter().map(|p| p.present).collect::<Vec<_>>(), vec![true, false]);
    }

    #[test]
    fn empty_or_reversed_window_sees_nothing() {
        let replay = sample_replayer();
        let result = replay.scan_window(10, 5, ORIGIN, &watched(), SamplingMode::EverySecond);
        assert!(result.iter().all(|p| !p.present));
        assert!(replay.scan_window(0, 10, ORIGIN, &[], SamplingMode::EventDriven).is_empty());
    }
}
