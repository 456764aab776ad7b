use log::LevelFilter;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::PathBuf;
use structopt::StructOpt;

use blockrail::planner::moving_block::MovingBlockModelBuilder;
use blockrail::planner::vss::VssFreeRoutesModelBuilder;
use blockrail::planner::{ModelDetail, VelocityRefinementStrategy};
use blockrail::railway::network::SeparationType;
use blockrail::simulation::objectives;
use blockrail::simulation::solution::RoutingSolution;
use blockrail::simulation::trajectory::TrainTrajectorySet;
use blockrail::simulation::SimulationInstance;
use blockrail::{RailError, Result};

/// blockrail -- railway operations optimisation
#[derive(StructOpt, Debug)]
#[structopt(name = "blockrail")]
struct Opt {
    /// Verbose mode (-v, -vv)
    #[structopt(short = "v", long = "verbose", parse(from_occurrences))]
    verbose: u8,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt, Debug)]
enum Command {
    /// Check an instance directory for consistency
    Check {
        /// Instance directory (network/, timetable/, routes/)
        #[structopt(parse(from_os_str))]
        instance: PathBuf,

        /// Require a route for every train
        #[structopt(long = "require-routes")]
        require_routes: bool,
    },
    /// Discretize all breakable edges and write the rewritten instance
    Discretize {
        #[structopt(parse(from_os_str))]
        instance: PathBuf,

        /// Output instance directory
        #[structopt(parse(from_os_str))]
        output: PathBuf,
    },
    /// Assemble the moving-block optimisation model
    MovingBlock {
        #[structopt(parse(from_os_str))]
        instance: PathBuf,

        /// Solver time limit in seconds
        #[structopt(long = "time-limit")]
        time_limit: Option<u64>,

        /// Route trains freely instead of following stored routes
        #[structopt(long = "free-routes")]
        free_routes: bool,

        /// Speed level spacing in m/s
        #[structopt(long = "velocity-delta", default_value = "5.55")]
        velocity_delta: f64,

        /// Print every constraint
        #[structopt(long = "debug")]
        debug: bool,
    },
    /// Assemble the VSS generation model with free routes
    VssGen {
        #[structopt(parse(from_os_str))]
        instance: PathBuf,

        /// Width of one discrete timestep in seconds
        #[structopt(long = "dt", default_value = "15")]
        dt: i64,

        /// Solver time limit in seconds
        #[structopt(long = "time-limit")]
        time_limit: Option<u64>,

        /// Print every constraint
        #[structopt(long = "debug")]
        debug: bool,
    },
    /// Simulate random routing solutions and report the objective
    Simulate {
        #[structopt(parse(from_os_str))]
        instance: PathBuf,

        /// PRNG seed; a fixed seed reproduces the run exactly
        #[structopt(long = "seed", default_value = "0")]
        seed: u64,

        /// Number of speed targets per train
        #[structopt(long = "v-targets", default_value = "10")]
        v_targets: usize,

        /// Number of switch decisions per train
        #[structopt(long = "switches", default_value = "20")]
        switches: usize,
    },
}

fn run(opt: &Opt) -> Result<()> {
    match &opt.command {
        Command::Check { instance, require_routes } => {
            let instance = blockrail::get_instance(instance, *require_routes)?;
            println!(
                "instance ok: {} vertices, {} edges, {} trains, max_t {}",
                instance.network.number_of_vertices(),
                instance.network.number_of_edges(),
                instance.timetable.get_train_list().size(),
                instance.max_t()
            );
        }
        Command::Discretize { instance, output } => {
            let mut instance = blockrail::get_instance(instance, false)?;
            instance.discretize(SeparationType::Uniform)?;
            blockrail::output::export_instance(output, &instance)?;
            println!(
                "discretized instance written: {} edges",
                instance.network.number_of_edges()
            );
        }
        Command::MovingBlock { instance, time_limit, free_routes, velocity_delta, debug } => {
            let instance = blockrail::get_instance(instance, !free_routes)?;
            let detail = ModelDetail {
                fix_routes: !free_routes,
                velocity_refinement_strategy: VelocityRefinementStrategy::MinOneStep,
                max_velocity_delta: *velocity_delta,
            };
            let builder = MovingBlockModelBuilder::new(&instance, detail);
            let (built, _status) = builder.solve(*time_limit, *debug)?;
            println!(
                "moving block model: {} variables, {} constraints",
                built.model.num_variables(),
                built.model.num_constraints()
            );
        }
        Command::VssGen { instance, dt, time_limit, debug } => {
            let instance = blockrail::get_instance(instance, false)?;
            let builder = VssFreeRoutesModelBuilder::new(&instance, *dt);
            let (built, _status) = builder.solve(*time_limit, *debug)?;
            println!(
                "vss generation model: {} variables, {} constraints, {} candidate separators",
                built.model.num_variables(),
                built.model.num_constraints(),
                built.b_pos.iter_set().count()
            );
        }
        Command::Simulate { instance, seed, v_targets, switches } => {
            let instance = blockrail::get_instance(instance, false)?;
            let sim = SimulationInstance::new(&instance)?;
            let mut rng = StdRng::seed_from_u64(*seed);
            let train_list = instance.timetable.get_train_list();
            let solutions: Vec<RoutingSolution> = train_list
                .iter()
                .map(|train| {
                    RoutingSolution::random(*v_targets, *switches, sim.n_timesteps, train, &mut rng)
                })
                .collect();
            let set = TrainTrajectorySet::new(&sim, &solutions)?;
            let collision = objectives::collision_penalty(&set)?;
            let destination = objectives::destination_penalty(&set)?;
            let stops = objectives::stop_penalty(&set)?;
            println!("collision penalty:   {:.4}", collision);
            println!("destination penalty: {:.4}", destination);
            println!("stop penalty:        {:.4}", stops);
            println!("combined objective:  {:.4}", collision + destination + stops);
        }
    }
    Ok(())
}

fn exit_code(e: &RailError) -> i32 {
    match e {
        RailError::IoFailure(_) => 1,
        RailError::InvalidInput(_)
        | RailError::NotFound(_)
        | RailError::Duplicate(_)
        | RailError::Consistency(_)
        | RailError::OutOfRange(_) => 2,
    }
}

fn main() {
    let opt = Opt::from_args();
    let level = match opt.verbose {
        0 => LevelFilter::Error,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    simple_logger::SimpleLogger::new().with_level(level).init().ok();

    match run(&opt) {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(exit_code(&e));
        }
    }
}
