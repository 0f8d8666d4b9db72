//! # TALLYSIM-RS
//!
//! Demo driver: three nested spheres with tagged cells and surfaces, a run
//! configuration from the command line (or a built-in default), and a batch
//! of synthetic 14.1 MeV neutron histories scored in parallel.
//!
//! ```text
//! tallysim [config.json|config.toml] [histories]
//! ```

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, warn};

use tallysim_rs::*;

const DEFAULT_HISTORIES: u64 = 100_000;
const SEED: u64 = 42;

const DEFAULT_CONFIG: &str = r#"{
    "Estimators": [
        {
            "Id": 0,
            "Multiplier": 1.0,
            "Bins": { "Energy Bins": [1e-3, 0.1, 1.0, 5.0, 10.0, 14.1, 14.1] }
        },
        {
            "Id": 1,
            "Response Functions": [1]
        },
        {
            "Id": 10,
            "Type": "Surface Flux",
            "Particle Type": "Neutron",
            "Surfaces": [1, 2, 3],
            "Bins": { "Cosine Bins": [-1.0, 0.0, 0.5, 1.0] }
        },
        {
            "Id": 20,
            "Type": "Hex Mesh Track-Length Flux",
            "Particle Type": "Neutron",
            "X Planes": [-30.0, -10.0, 10.0, 30.0],
            "Y Planes": [-30.0, 30.0],
            "Z Planes": [-30.0, 30.0],
            "Bins": { "Collision Number Bins": [0, 1, 5] }
        }
    ],
    "Response Functions": [
        {
            "Id": 1,
            "Name": "flat-above-1MeV",
            "Energy Grid": [0.0, 1.0, 1.0000001, 20.0],
            "Values": [0.0, 0.0, 1.0, 1.0]
        }
    ]
}"#;

fn geometry() -> InMemoryGeometry {
    InMemoryGeometry::concentric_spheres(&[10.0, 20.0, 30.0])
        .with_property(EntityKind::Cell, 1, "estimator", "0.cell.tl.flux.n")
        .with_property(EntityKind::Cell, 2, "estimator", "0.cell.tl.flux.n")
        .with_property(EntityKind::Cell, 3, "estimator", "0.cell.tl.flux.n")
        .with_property(EntityKind::Cell, 2, "estimator", "1.cell.c.flux.n")
        .with_property(EntityKind::Surface, 3, "estimator", "2.surface.current.n")
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => RunConfig::from_path(path)?,
        None => RunConfig::from_json_str(DEFAULT_CONFIG)?,
    };
    let histories = match args.next().map(|h| h.parse::<u64>()) {
        Some(Ok(h)) => h,
        Some(Err(err)) => {
            warn!(%err, "invalid history count, using {}", DEFAULT_HISTORIES);
            DEFAULT_HISTORIES
        }
        None => DEFAULT_HISTORIES,
    };

    let factory = EstimatorFactory::from_config(Arc::new(geometry()), &config)?;
    let mut handler = EventHandler::new();
    factory.build_all(&config, &mut handler)?;

    let source = SphericalRandomWalk::new(
        vec![10.0, 20.0, 30.0],
        vec![
            ShellMaterial::new(0.05, 0.1),
            ShellMaterial::new(0.2, 0.3),
            ShellMaterial::new(0.1, 0.5),
        ],
    )?
    .with_source(ParticleType::Neutron, 14.1);

    let summary = handler.run_histories(&source, histories, SEED);

    println!("{}", info());
    println!();
    println!("{}", summary);
    println!();
    println!("{}", handler.summary());
    Ok(())
}

fn main() -> ExitCode {
    if let Err(err) = logging::init_tracing() {
        eprintln!("logging disabled: {err}");
    }

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(estimator = ?err.estimator_id(), "{err}");
            ExitCode::FAILURE
        }
    }
}
