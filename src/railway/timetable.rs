use crate::railway::network::Network;
use crate::railway::stations::StationList;
use crate::railway::trains::{Train, TrainList};
use crate::railway::{EdgeId, TrainId, VertexId};
use crate::{RailError, Result};

/// A scheduled stop with an arrival window, a departure window and a minimum
/// dwell time. Fixed-time stops are stored as point windows.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralScheduledStop {
    pub begin: (i64, i64),
    pub end: (i64, i64),
    pub min_stopping_time: i64,
    pub station: String,
}

impl GeneralScheduledStop {
    pub fn new(begin: (i64, i64), end: (i64, i64), min_stopping_time: i64, station: &str) -> Result<Self> {
        if begin.1 < begin.0 {
            return Err(RailError::InvalidInput("arrival window has negative length".to_string()));
        }
        if end.1 < end.0 {
            return Err(RailError::InvalidInput("departure window has negative length".to_string()));
        }
        if min_stopping_time <= 0 {
            return Err(RailError::InvalidInput("minimum stopping time is non-positive".to_string()));
        }
        if begin.0 < 0 || end.0 < 0 {
            return Err(RailError::InvalidInput("stop window starts before time zero".to_string()));
        }
        if end.1 < begin.0 {
            return Err(RailError::InvalidInput("departure window ends before arrival window".to_string()));
        }
        if end.1 - begin.0 < min_stopping_time {
            return Err(RailError::InvalidInput(
                "maximal stop interval is shorter than the minimum stopping time".to_string(),
            ));
        }
        Ok(GeneralScheduledStop { begin, end, min_stopping_time, station: station.to_string() })
    }

    /// A stop with fixed arrival and departure; the dwell time is the whole
    /// interval.
    pub fn fixed(begin: i64, end: i64, station: &str) -> Result<Self> {
        Self::new((begin, begin), (end, end), end - begin, station)
    }

    pub fn arrival(&self) -> i64 {
        self.begin.0
    }

    pub fn departure(&self) -> i64 {
        self.end.0
    }

    /// Times at which the train is stopped in every feasible realisation:
    /// from the latest possible arrival to the earliest possible departure.
    /// May be empty (first > second).
    pub fn forced_stopping_interval(&self) -> (i64, i64) {
        let latest_arrival = self.begin.1.min(self.end.1 - self.min_stopping_time);
        let earliest_departure = self.end.0.max(self.begin.0 + self.min_stopping_time);
        (latest_arrival, earliest_departure)
    }

    pub fn conflicts_with(&self, other: &GeneralScheduledStop) -> bool {
        if self.station == other.station {
            return true;
        }
        let i1 = self.forced_stopping_interval();
        let i2 = other.forced_stopping_interval();
        if i1.0 > i1.1 || i2.0 > i2.1 {
            return false;
        }
        i1.0 <= i2.1 && i2.0 <= i1.1
    }

    pub fn precedes(&self, other: &GeneralScheduledStop) -> bool {
        !self.conflicts_with(other) && self.begin.1 < other.begin.0 && self.end.0 < other.begin.1
    }
}

#[derive(Debug, Clone)]
pub struct GeneralSchedule {
    pub t_0: (i64, i64),
    pub v_0: f64,
    pub entry: VertexId,
    pub t_n: (i64, i64),
    pub v_n: f64,
    pub exit: VertexId,
    pub stops: Vec<GeneralScheduledStop>,
}

impl GeneralSchedule {
    pub fn new(t_0: (i64, i64), v_0: f64, entry: VertexId, t_n: (i64, i64), v_n: f64, exit: VertexId) -> Result<Self> {
        if t_0.1 < t_0.0 || t_n.1 < t_n.0 {
            return Err(RailError::InvalidInput("schedule window has negative length".to_string()));
        }
        if t_0.0 < 0 {
            return Err(RailError::InvalidInput("entry time before time zero".to_string()));
        }
        Ok(GeneralSchedule { t_0, v_0, entry, t_n, v_n, exit, stops: Vec::new() })
    }

    pub fn t_0(&self) -> i64 {
        self.t_0.0
    }

    pub fn t_n(&self) -> i64 {
        self.t_n.0
    }

    pub fn add_stop(&mut self, stop: GeneralScheduledStop, sort: bool) -> Result<()> {
        for existing in &self.stops {
            if existing.conflicts_with(&stop) {
                return Err(RailError::Consistency(format!(
                    "stop at {} conflicts with existing stop at {}",
                    stop.station, existing.station
                )));
            }
        }
        self.stops.push(stop);
        if sort {
            self.sort_stops();
        }
        Ok(())
    }

    pub fn sort_stops(&mut self) {
        self.stops.sort_by(|a, b| {
            if a.precedes(b) {
                std::cmp::Ordering::Less
            } else if b.precedes(a) {
                std::cmp::Ordering::Greater
            } else {
                std::cmp::Ordering::Equal
            }
        });
    }
}

/// Per-train schedules over a shared station list and train catalogue.
/// Train indices and schedule indices coincide.
#[derive(Debug, Default)]
pub struct Timetable {
    station_list: StationList,
    train_list: TrainList,
    schedules: Vec<GeneralSchedule>,
}

impl Timetable {
    pub fn new() -> Self {
        Default::default()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_train(
        &mut self,
        name: &str,
        length: f64,
        max_speed: f64,
        acceleration: f64,
        deceleration: f64,
        t_0: i64,
        v_0: f64,
        entry: &str,
        t_n: i64,
        v_n: f64,
        exit: &str,
        network: &Network,
    ) -> Result<TrainId> {
        let entry = network.get_vertex_index(entry)?;
        let exit = network.get_vertex_index(exit)?;
        self.add_train_general(
            name,
            length,
            max_speed,
            acceleration,
            deceleration,
            true,
            (t_0, t_0),
            v_0,
            entry,
            (t_n, t_n),
            v_n,
            exit,
            network,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_train_general(
        &mut self,
        name: &str,
        length: f64,
        max_speed: f64,
        acceleration: f64,
        deceleration: f64,
        tim: bool,
        t_0: (i64, i64),
        v_0: f64,
        entry: VertexId,
        t_n: (i64, i64),
        v_n: f64,
        exit: VertexId,
        network: &Network,
    ) -> Result<TrainId> {
        if !network.has_vertex_index(entry) {
            return Err(RailError::NotFound(format!("vertex index {}", entry)));
        }
        if !network.has_vertex_index(exit) {
            return Err(RailError::NotFound(format!("vertex index {}", exit)));
        }
        let schedule = GeneralSchedule::new(t_0, v_0, entry, t_n, v_n, exit)?;
        let index = self.train_list.add_train(name, length, max_speed, acceleration, deceleration, tim)?;
        self.schedules.push(schedule);
        Ok(index)
    }

    pub fn add_station(&mut self, name: &str) -> Result<()> {
        self.station_list.add_station(name)
    }

    pub fn add_track_to_station(&mut self, name: &str, track: EdgeId, network: &Network) -> Result<()> {
        self.station_list.add_track_to_station(name, track, network)
    }

    pub fn add_track_to_station_by_names(
        &mut self,
        name: &str,
        source: &str,
        target: &str,
        network: &Network,
    ) -> Result<()> {
        let track = network.get_edge_index_by_names(source, target)?;
        self.station_list.add_track_to_station(name, track, network)
    }

    /// Adds a fixed-time stop and keeps the stop list sorted.
    pub fn add_stop(&mut self, train: &str, station: &str, begin: i64, end: i64) -> Result<()> {
        let stop = GeneralScheduledStop::fixed(begin, end, station)?;
        self.add_stop_general(train, stop, true)
    }

    pub fn add_stop_general(&mut self, train: &str, stop: GeneralScheduledStop, sort: bool) -> Result<()> {
        let tr = self.train_list.get_train_index(train)?;
        if !self.station_list.has_station(&stop.station) {
            return Err(RailError::NotFound(format!("station {}", stop.station)));
        }
        self.schedules[tr].add_stop(stop, sort)
    }

    pub fn get_train_list(&self) -> &TrainList {
        &self.train_list
    }

    pub fn get_station_list(&self) -> &StationList {
        &self.station_list
    }

    pub fn get_schedule(&self, tr: TrainId) -> Result<&GeneralSchedule> {
        self.schedules
            .get(tr)
            .ok_or_else(|| RailError::NotFound(format!("train index {}", tr)))
    }

    pub fn get_schedule_by_name(&self, train: &str) -> Result<&GeneralSchedule> {
        let tr = self.train_list.get_train_index(train)?;
        self.get_schedule(tr)
    }

    pub fn get_train(&self, tr: TrainId) -> Result<&Train> {
        self.train_list.get_train(tr)
    }

    pub fn sort_stops(&mut self) {
        for schedule in self.schedules.iter_mut() {
            schedule.sort_stops();
        }
    }

    /// Latest time referenced anywhere in the timetable.
    pub fn max_t(&self) -> i64 {
        let mut max_t = 0;
        for schedule in &self.schedules {
            max_t = max_t.max(schedule.t_n.1);
            for stop in &schedule.stops {
                max_t = max_t.max(stop.end.1);
            }
        }
        max_t
    }

    pub fn time_interval(&self, tr: TrainId) -> Result<(i64, i64)> {
        let schedule = self.get_schedule(tr)?;
        Ok((schedule.t_0.0, schedule.t_n.1))
    }

    /// The discrete index range covering a train's time interval for timestep
    /// width `dt`. An exact upper fit is dropped when `tn_inclusive` is false.
    pub fn time_index_interval(&self, tr: TrainId, dt: i64, tn_inclusive: bool) -> Result<(usize, usize)> {
        if dt <= 0 {
            return Err(RailError::InvalidInput("timestep width must be positive".to_string()));
        }
        let (t0, tn) = self.time_interval(tr)?;
        let first = (t0 / dt) as usize;
        let mut last = ((tn + dt - 1) / dt) as usize;
        if !tn_inclusive && tn % dt == 0 && last > 0 {
            last -= 1;
        }
        Ok((first, last))
    }

    pub fn update_after_discretization(&mut self, new_edges: &[(EdgeId, Vec<EdgeId>)]) {
        self.station_list.update_after_discretization(new_edges);
    }

    /// Entry and exit vertices exist, stop stations exist, and the stops of
    /// every train are pairwise conflict-free.
    pub fn check_consistency(&self, network: &Network) -> bool {
        if self.schedules.len() != self.train_list.size() {
            return false;
        }
        for schedule in &self.schedules {
            if !network.has_vertex_index(schedule.entry) || !network.has_vertex_index(schedule.exit) {
                return false;
            }
            for stop in &schedule.stops {
                if !self.station_list.has_station(&stop.station) {
                    return false;
                }
            }
            for (i, a) in schedule.stops.iter().enumerate() {
                for b in schedule.stops.iter().skip(i + 1) {
                    if a.conflicts_with(b) {
                        return false;
                    }
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::railway::network::VertexType;

    fn line_network() -> Network {
        let mut network = Network::new();
        for name in &["l0", "l1", "g0", "g1", "r1", "r0"] {
            network.add_vertex(name, VertexType::Ttd).unwrap();
        }
        let e0 = network.add_edge_by_names("l0", "l1", 5.0, 30.0, false, 0.0).unwrap();
        let e1 = network.add_edge_by_names("l1", "g0", 500.0, 30.0, false, 0.0).unwrap();
        let e2 = network.add_edge_by_names("g0", "g1", 300.0, 30.0, false, 0.0).unwrap();
        let e3 = network.add_edge_by_names("g1", "r1", 500.0, 30.0, false, 0.0).unwrap();
        let e4 = network.add_edge_by_names("r1", "r0", 5.0, 30.0, false, 0.0).unwrap();
        network.add_successor(e0, e1).unwrap();
        network.add_successor(e1, e2).unwrap();
        network.add_successor(e2, e3).unwrap();
        network.add_successor(e3, e4).unwrap();
        network
    }

    #[test]
    fn test_forced_stopping_interval() {
        let fixed = GeneralScheduledStop::fixed(240, 300, "Central").unwrap();
        assert_eq!(fixed.min_stopping_time, 60);
        assert_eq!(fixed.forced_stopping_interval(), (240, 300));

        let general =
            GeneralScheduledStop::new((100, 160), (200, 260), 30, "Central").unwrap();
        // latest arrival min(160, 260-30), earliest departure max(200, 100+30)
        assert_eq!(general.forced_stopping_interval(), (160, 200));

        let loose = GeneralScheduledStop::new((0, 100), (10, 120), 5, "Other").unwrap();
        let (a, b) = loose.forced_stopping_interval();
        assert!(a > b, "interval {}..{} should be empty", a, b);
    }

    #[test]
    fn test_stop_validation() {
        assert!(GeneralScheduledStop::fixed(300, 300, "S").is_err());
        assert!(GeneralScheduledStop::fixed(300, 240, "S").is_err());
        assert!(GeneralScheduledStop::new((10, 5), (20, 30), 1, "S").is_err());
        assert!(GeneralScheduledStop::new((-5, 5), (20, 30), 1, "S").is_err());
        assert!(GeneralScheduledStop::new((10, 20), (30, 40), 50, "S").is_err());
    }

    #[test]
    fn test_stop_conflicts() {
        // Same station always conflicts.
        let a = GeneralScheduledStop::fixed(100, 160, "S1").unwrap();
        let b = GeneralScheduledStop::fixed(400, 460, "S1").unwrap();
        assert!(a.conflicts_with(&b));

        // Same time, different stations.
        let c = GeneralScheduledStop::fixed(100, 160, "S2").unwrap();
        assert!(a.conflicts_with(&c));

        // Disjoint forced intervals, different stations.
        let d = GeneralScheduledStop::fixed(200, 260, "S2").unwrap();
        assert!(!a.conflicts_with(&d));
        assert!(a.precedes(&d));
        assert!(!d.precedes(&a));
    }

    #[test]
    fn test_sorted_stops_are_totally_ordered() {
        let mut schedule = GeneralSchedule::new((0, 0), 0.0, 0, (1000, 1000), 10.0, 5).unwrap();
        schedule
            .add_stop(GeneralScheduledStop::fixed(400, 460, "S3").unwrap(), false)
            .unwrap();
        schedule
            .add_stop(GeneralScheduledStop::fixed(100, 160, "S1").unwrap(), false)
            .unwrap();
        schedule
            .add_stop(GeneralScheduledStop::fixed(250, 310, "S2").unwrap(), false)
            .unwrap();
        schedule.sort_stops();
        let names: Vec<&str> = schedule.stops.iter().map(|s| s.station.as_str()).collect();
        assert_eq!(names, vec!["S1", "S2", "S3"]);
        for i in 0..schedule.stops.len() {
            for j in i + 1..schedule.stops.len() {
                assert!(schedule.stops[i].precedes(&schedule.stops[j]));
            }
        }
    }

    #[test]
    fn test_timetable() {
        let network = line_network();
        let mut timetable = Timetable::new();

        timetable
            .add_train("tr1", 100.0, 83.33, 2.0, 1.0, 120, 0.0, "l0", 645, 16.67, "r0", &network)
            .unwrap();
        timetable
            .add_train("tr2", 100.0, 27.78, 2.0, 1.0, 0, 0.0, "l0", 420, 16.67, "r0", &network)
            .unwrap();
        assert!(timetable
            .add_train("tr1", 100.0, 83.33, 2.0, 1.0, 0, 0.0, "l0", 100, 0.0, "r0", &network)
            .is_err());
        assert!(timetable
            .add_train("tr3", 100.0, 83.33, 2.0, 1.0, 0, 0.0, "nowhere", 100, 0.0, "r0", &network)
            .is_err());

        timetable.add_station("Central").unwrap();
        timetable
            .add_track_to_station_by_names("Central", "g0", "g1", &network)
            .unwrap();

        timetable.add_stop("tr1", "Central", 240, 300).unwrap();
        timetable.add_stop("tr2", "Central", 120, 300).unwrap();
        assert!(timetable.add_stop("tr1", "Central", 400, 500).is_err());
        assert!(timetable.add_stop("tr1", "Nowhere", 400, 500).is_err());

        let schedule = timetable.get_schedule_by_name("tr1").unwrap();
        assert_eq!(schedule.t_0(), 120);
        assert_eq!(schedule.t_n(), 645);
        assert_eq!(schedule.v_n, 16.67);
        assert_eq!(schedule.stops.len(), 1);
        assert_eq!(schedule.stops[0].arrival(), 240);
        assert_eq!(schedule.stops[0].departure(), 300);

        assert_eq!(timetable.max_t(), 645);
        assert_eq!(timetable.time_interval(0).unwrap(), (120, 645));
        assert_eq!(timetable.time_interval(1).unwrap(), (0, 420));
        assert!(timetable.check_consistency(&network));
    }

    #[test]
    fn test_time_index_interval() {
        let network = line_network();
        let mut timetable = Timetable::new();
        timetable
            .add_train("tr1", 100.0, 80.0, 2.0, 1.0, 120, 0.0, "l0", 645, 10.0, "r0", &network)
            .unwrap();
        timetable
            .add_train("tr2", 100.0, 80.0, 2.0, 1.0, 0, 0.0, "l0", 600, 10.0, "r0", &network)
            .unwrap();

        assert_eq!(timetable.time_index_interval(0, 15, true).unwrap(), (8, 43));
        assert_eq!(timetable.time_index_interval(0, 15, false).unwrap(), (8, 42));
        assert_eq!(timetable.time_index_interval(1, 60, true).unwrap(), (0, 10));
        assert_eq!(timetable.time_index_interval(1, 60, false).unwrap(), (0, 9));
        assert!(timetable.time_index_interval(0, 0, true).is_err());
    }
}
