//! JSON import of problem instances. The on-disk layout is one directory per
//! instance with `network/`, `timetable/` and optionally `routes/`; all
//! references between files are by vertex/edge/train name, indices are
//! assigned by array order so that a round trip restores them exactly.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::instance::VssGenerationTimetable;
use crate::railway::network::{Network, VertexType};
use crate::railway::routes::RouteMap;
use crate::railway::timetable::{GeneralScheduledStop, Timetable};
use crate::railway::trains::TrainList;
use crate::{read_file, RailError, Result};

#[derive(Debug, Serialize, Deserialize)]
pub struct VertexDto {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EdgeDto {
    pub source: String,
    pub target: String,
    pub length: f64,
    pub max_speed: f64,
    pub breakable: bool,
    #[serde(default)]
    pub min_block_length: f64,
}

pub type SuccessorsDto = BTreeMap<String, Vec<(String, String)>>;

#[derive(Debug, Serialize, Deserialize)]
pub struct TrainDto {
    pub name: String,
    pub length: f64,
    pub max_speed: f64,
    pub acceleration: f64,
    pub deceleration: f64,
    #[serde(default = "default_tim")]
    pub tim: bool,
}

fn default_tim() -> bool {
    true
}

/// Fixed-time files carry plain integers; the general format uses ranges.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TimeSpec {
    Point(i64),
    Range([i64; 2]),
}

impl TimeSpec {
    pub fn as_range(&self) -> (i64, i64) {
        match *self {
            TimeSpec::Point(t) => (t, t),
            TimeSpec::Range([a, b]) => (a, b),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StopDto {
    pub begin: TimeSpec,
    pub end: TimeSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_stopping_time: Option<i64>,
    pub station: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScheduleDto {
    pub t_0: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_0_range: Option<[i64; 2]>,
    pub v_0: f64,
    pub entry: String,
    pub t_n: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub t_n_range: Option<[i64; 2]>,
    pub v_n: f64,
    pub exit: String,
    #[serde(default)]
    pub stops: Vec<StopDto>,
}

pub type StationsDto = BTreeMap<String, Vec<(String, String)>>;
pub type RoutesDto = BTreeMap<String, Vec<(String, String)>>;

fn parse_vertex_type(s: &str) -> Result<VertexType> {
    match s {
        "NoBorder" => Ok(VertexType::NoBorder),
        "NoBorderVSS" => Ok(VertexType::NoBorderVSS),
        "VSS" => Ok(VertexType::Vss),
        "TTD" => Ok(VertexType::Ttd),
        other => Err(RailError::IoFailure(format!("unknown vertex type {}", other))),
    }
}

pub fn vertex_type_name(kind: VertexType) -> &'static str {
    match kind {
        VertexType::NoBorder => "NoBorder",
        VertexType::NoBorderVSS => "NoBorderVSS",
        VertexType::Vss => "VSS",
        VertexType::Ttd => "TTD",
    }
}

fn parse_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let contents = read_file(path)?;
    let value = serde_json::from_str(&contents)
        .map_err(|e| RailError::IoFailure(format!("{}: {}", path.display(), e)))?;
    Ok(value)
}

pub fn import_network(dir: &Path) -> Result<Network> {
    let vertices: Vec<VertexDto> = parse_json(&dir.join("vertices.json"))?;
    let edges: Vec<EdgeDto> = parse_json(&dir.join("edges.json"))?;
    let successors: SuccessorsDto = parse_json(&dir.join("successors.json"))?;

    let mut network = Network::new();
    for v in &vertices {
        network.add_vertex(&v.name, parse_vertex_type(&v.kind)?)?;
    }
    for e in &edges {
        network.add_edge_by_names(
            &e.source,
            &e.target,
            e.length,
            e.max_speed,
            e.breakable,
            e.min_block_length,
        )?;
    }
    for (from, to_list) in &successors {
        let mut parts = from.splitn(2, "->");
        let source = parts.next().unwrap_or("");
        let target = parts
            .next()
            .ok_or_else(|| RailError::IoFailure(format!("malformed successor key {}", from)))?;
        let e1 = network.get_edge_index_by_names(source, target)?;
        for (s, t) in to_list {
            let e2 = network.get_edge_index_by_names(s, t)?;
            network.add_successor(e1, e2)?;
        }
    }
    Ok(network)
}

pub fn import_trains(dir: &Path) -> Result<TrainList> {
    let dtos: Vec<TrainDto> = parse_json(&dir.join("trains.json"))?;
    let mut trains = TrainList::new();
    for t in &dtos {
        trains.add_train(&t.name, t.length, t.max_speed, t.acceleration, t.deceleration, t.tim)?;
    }
    Ok(trains)
}

pub fn import_timetable(dir: &Path, network: &Network) -> Result<Timetable> {
    let trains: Vec<TrainDto> = parse_json(&dir.join("trains.json"))?;
    let stations: StationsDto = parse_json(&dir.join("stations.json"))?;
    let schedules: Vec<ScheduleDto> = parse_json(&dir.join("schedules.json"))?;
    if trains.len() != schedules.len() {
        return Err(RailError::Consistency(format!(
            "{} trains but {} schedules",
            trains.len(),
            schedules.len()
        )));
    }

    let mut timetable = Timetable::new();
    for name in stations.keys() {
        timetable.add_station(name)?;
    }
    for (name, tracks) in &stations {
        for (s, t) in tracks {
            timetable.add_track_to_station_by_names(name, s, t, network)?;
        }
    }
    for (train, schedule) in trains.iter().zip(schedules.iter()) {
        let t_0 = schedule.t_0_range.map(|[a, b]| (a, b)).unwrap_or((schedule.t_0, schedule.t_0));
        let t_n = schedule.t_n_range.map(|[a, b]| (a, b)).unwrap_or((schedule.t_n, schedule.t_n));
        timetable.add_train_general(
            &train.name,
            train.length,
            train.max_speed,
            train.acceleration,
            train.deceleration,
            train.tim,
            t_0,
            schedule.v_0,
            network.get_vertex_index(&schedule.entry)?,
            t_n,
            schedule.v_n,
            network.get_vertex_index(&schedule.exit)?,
            network,
        )?;
        for stop in &schedule.stops {
            let begin = stop.begin.as_range();
            let end = stop.end.as_range();
            let min_stopping_time = stop.min_stopping_time.unwrap_or(end.1 - begin.0);
            let stop =
                GeneralScheduledStop::new(begin, end, min_stopping_time, &stop.station)?;
            timetable.add_stop_general(&train.name, stop, false)?;
        }
    }
    timetable.sort_stops();
    Ok(timetable)
}

pub fn import_routes(dir: &Path, network: &Network) -> Result<RouteMap> {
    let mut routes = RouteMap::new();
    let path = dir.join("routes.json");
    if !path.is_file() {
        return Ok(routes);
    }
    let dtos: RoutesDto = parse_json(&path)?;
    for (train, edges) in &dtos {
        routes.add_empty_route(train)?;
        for (s, t) in edges {
            routes.push_back_edge_by_names(train, s, t, network)?;
        }
    }
    Ok(routes)
}

pub fn import_instance(dir: &Path, every_train_must_have_route: bool) -> Result<VssGenerationTimetable> {
    let network = import_network(&dir.join("network"))?;
    let timetable = import_timetable(&dir.join("timetable"), &network)?;
    let routes = import_routes(&dir.join("routes"), &network)?;
    let instance = VssGenerationTimetable::new(network, timetable, routes);
    if !instance.check_consistency(every_train_must_have_route) {
        return Err(RailError::Consistency("imported instance is not consistent".to_string()));
    }
    Ok(instance)
}
