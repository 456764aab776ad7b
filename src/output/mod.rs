//! JSON export, mirroring the import layout exactly so that
//! `import(export(x))` restores identical indices and attributes.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::input::{
    vertex_type_name, EdgeDto, RoutesDto, ScheduleDto, StationsDto, StopDto, SuccessorsDto,
    TimeSpec, TrainDto, VertexDto,
};
use crate::instance::VssGenerationTimetable;
use crate::railway::network::Network;
use crate::railway::routes::RouteMap;
use crate::railway::timetable::Timetable;
use crate::{RailError, Result};

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let contents = serde_json::to_string_pretty(value)?;
    std::fs::write(path, contents)
        .map_err(|e| RailError::IoFailure(format!("{}: {}", path.display(), e)))?;
    Ok(())
}

fn edge_name_pair(network: &Network, e: usize) -> Result<(String, String)> {
    let edge = network.get_edge(e)?;
    Ok((
        network.get_vertex(edge.source)?.name.clone(),
        network.get_vertex(edge.target)?.name.clone(),
    ))
}

pub fn export_network(dir: &Path, network: &Network) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let vertices: Vec<VertexDto> = (0..network.number_of_vertices())
        .map(|v| {
            let vertex = network.get_vertex(v).unwrap();
            VertexDto { name: vertex.name.clone(), kind: vertex_type_name(vertex.kind).to_string() }
        })
        .collect();
    write_json(&dir.join("vertices.json"), &vertices)?;

    let mut edges = Vec::with_capacity(network.number_of_edges());
    for e in 0..network.number_of_edges() {
        let edge = network.get_edge(e)?;
        let (source, target) = edge_name_pair(network, e)?;
        edges.push(EdgeDto {
            source,
            target,
            length: edge.length,
            max_speed: edge.max_speed,
            breakable: edge.breakable,
            min_block_length: edge.min_block_length,
        });
    }
    write_json(&dir.join("edges.json"), &edges)?;

    let mut successors: SuccessorsDto = BTreeMap::new();
    for e in 0..network.number_of_edges() {
        let list = network.get_successors(e);
        if list.is_empty() {
            continue;
        }
        let (source, target) = edge_name_pair(network, e)?;
        let mut names = Vec::with_capacity(list.len());
        for &s in list {
            names.push(edge_name_pair(network, s)?);
        }
        successors.insert(format!("{}->{}", source, target), names);
    }
    write_json(&dir.join("successors.json"), &successors)?;
    Ok(())
}

pub fn export_timetable(dir: &Path, timetable: &Timetable, network: &Network) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let trains: Vec<TrainDto> = timetable
        .get_train_list()
        .iter()
        .map(|t| TrainDto {
            name: t.name.clone(),
            length: t.length,
            max_speed: t.max_speed,
            acceleration: t.acceleration,
            deceleration: t.deceleration,
            tim: t.tim,
        })
        .collect();
    write_json(&dir.join("trains.json"), &trains)?;

    let mut stations: StationsDto = BTreeMap::new();
    for station in timetable.get_station_list().iter() {
        let mut tracks = Vec::with_capacity(station.tracks.len());
        for &t in &station.tracks {
            tracks.push(edge_name_pair(network, t)?);
        }
        stations.insert(station.name.clone(), tracks);
    }
    write_json(&dir.join("stations.json"), &stations)?;

    let mut schedules = Vec::with_capacity(timetable.get_train_list().size());
    for tr in 0..timetable.get_train_list().size() {
        let schedule = timetable.get_schedule(tr)?;
        let stops = schedule
            .stops
            .iter()
            .map(|s| StopDto {
                begin: TimeSpec::Range([s.begin.0, s.begin.1]),
                end: TimeSpec::Range([s.end.0, s.end.1]),
                min_stopping_time: Some(s.min_stopping_time),
                station: s.station.clone(),
            })
            .collect();
        schedules.push(ScheduleDto {
            t_0: schedule.t_0.0,
            t_0_range: Some([schedule.t_0.0, schedule.t_0.1]),
            v_0: schedule.v_0,
            entry: network.get_vertex(schedule.entry)?.name.clone(),
            t_n: schedule.t_n.0,
            t_n_range: Some([schedule.t_n.0, schedule.t_n.1]),
            v_n: schedule.v_n,
            exit: network.get_vertex(schedule.exit)?.name.clone(),
            stops,
        });
    }
    write_json(&dir.join("schedules.json"), &schedules)?;
    Ok(())
}

pub fn export_routes(dir: &Path, routes: &RouteMap, network: &Network) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    let mut dto: RoutesDto = BTreeMap::new();
    for (train, route) in routes.iter() {
        let mut edges = Vec::with_capacity(route.size());
        for &e in route.edges() {
            edges.push(edge_name_pair(network, e)?);
        }
        dto.insert(train.clone(), edges);
    }
    write_json(&dir.join("routes.json"), &dto)?;
    Ok(())
}

pub fn export_instance(dir: &Path, instance: &VssGenerationTimetable) -> Result<()> {
    std::fs::create_dir_all(dir)?;
    export_network(&dir.join("network"), &instance.network)?;
    export_timetable(&dir.join("timetable"), &instance.timetable, &instance.network)?;
    export_routes(&dir.join("routes"), &instance.routes, &instance.network)?;
    Ok(())
}
