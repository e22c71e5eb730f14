//! mna-playground - step built-in demo circuits and print what happens.
//!
//! # Usage
//!
//! ```bash
//! mna-playground --demo rc --dt 0.01 --steps 20
//! RUST_LOG=mna_core=debug mna-playground --demo diode --model 1N4004
//! mna-playground --demo divider --dot | dot -Tpng > divider.png
//! ```

use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use mna_core::{
    validate_circuit, Capacitor, Circuit, CircuitConfig, DiodeData, Inductor, RealisticDiode,
    Resistor, Result, VoltageSource,
};

/// Built-in circuits.
#[derive(ValueEnum, Clone, Copy, Debug)]
enum Demo {
    /// 10 V across a 1 Ω + 2 Ω divider
    Divider,
    /// 5 V charging 100 µF through 1 kΩ
    Rc,
    /// 1 V driving 1 H through 1 Ω
    Rl,
    /// 5 V forward-biasing a diode through 1 kΩ
    Diode,
    /// 10 V reverse-biasing a Zener diode through 1 kΩ
    Zener,
}

/// Real-time MNA circuit simulator playground
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Circuit to simulate
    #[arg(short, long, value_enum, default_value_t = Demo::Divider)]
    demo: Demo,

    /// Tick length in seconds
    #[arg(long, default_value_t = 0.05)]
    dt: f64,

    /// Number of ticks to run
    #[arg(short, long, default_value_t = 10)]
    steps: usize,

    /// Maximum nonlinear substeps per tick
    #[arg(long, default_value_t = mna_core::solver::DEFAULT_MAX_SUB_STEPS)]
    max_sub_steps: usize,

    /// Convergence slack in volts
    #[arg(long, default_value_t = mna_core::solver::DEFAULT_SLACK)]
    slack: f64,

    /// Diode model for the diode demos (see DiodeData::MODELS)
    #[arg(short, long)]
    model: Option<String>,

    /// Print the circuit as a Graphviz graph instead of simulating
    #[arg(long)]
    dot: bool,
}

fn build(demo: Demo, model: Option<&str>, config: CircuitConfig) -> Result<Circuit> {
    let mut circuit = Circuit::with_config(config);
    match demo {
        Demo::Divider => {
            let vs = circuit.add(VoltageSource::new(10.0).named("vs"));
            let r1 = circuit.add(Resistor::new(1.0).named("r1"));
            let r2 = circuit.add(Resistor::new(2.0).named("r2"));
            circuit.connect(vs, 0, r1, 0)?;
            circuit.connect(r1, 1, r2, 0)?;
            circuit.connect(r2, 1, vs, 1)?;
            circuit.ground(vs, 1)?;
            circuit.name_node(r1, 1, "mid")?;
        }
        Demo::Rc => {
            let vs = circuit.add(VoltageSource::new(5.0).named("vs"));
            let r = circuit.add(Resistor::new(1e3).named("r"));
            let c = circuit.add(Capacitor::new(100e-6).named("c"));
            circuit.connect(vs, 0, r, 0)?;
            circuit.connect(r, 1, c, 0)?;
            circuit.connect(c, 1, vs, 1)?;
            circuit.ground(vs, 1)?;
        }
        Demo::Rl => {
            let vs = circuit.add(VoltageSource::new(1.0).named("vs"));
            let r = circuit.add(Resistor::new(1.0).named("r"));
            let l = circuit.add(Inductor::new(1.0).named("l"));
            circuit.connect(vs, 0, r, 0)?;
            circuit.connect(r, 1, l, 0)?;
            circuit.connect(l, 1, vs, 1)?;
            circuit.ground(vs, 1)?;
        }
        Demo::Diode => {
            let data = DiodeData::by_name(model.unwrap_or("switching-1N4148"))?;
            let vs = circuit.add(VoltageSource::new(5.0).named("vs"));
            let r = circuit.add(Resistor::new(1e3).named("r"));
            let d = circuit.add(RealisticDiode::new(data).named("d"));
            circuit.connect(vs, 0, r, 0)?;
            circuit.connect(r, 1, d, 0)?;
            circuit.connect(d, 1, vs, 1)?;
            circuit.ground(vs, 1)?;
        }
        Demo::Zener => {
            let data = DiodeData::by_name(model.unwrap_or("falstad-zener"))?;
            let vs = circuit.add(VoltageSource::new(10.0).named("vs"));
            let r = circuit.add(Resistor::new(1e3).named("r"));
            let d = circuit.add(RealisticDiode::new(data).named("dz"));
            circuit.connect(vs, 0, r, 0)?;
            circuit.connect(r, 1, d, 1)?;
            circuit.connect(d, 0, vs, 1)?;
            circuit.ground(vs, 1)?;
        }
    }
    Ok(circuit)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = CircuitConfig::new()
        .with_max_sub_steps(args.max_sub_steps)
        .with_slack(args.slack);
    let mut circuit = build(args.demo, args.model.as_deref(), config)?;
    validate_circuit(&circuit)?;

    if args.dot {
        print!("{}", circuit.to_dot());
        return Ok(());
    }

    for tick in 1..=args.steps {
        let report = circuit.step(args.dt)?;
        println!(
            "tick {tick} (t = {:.3}s): solved={} substeps={} converged={}",
            tick as f64 * args.dt,
            report.solved,
            report.substeps,
            report.converged
        );
        for (id, component) in circuit.components() {
            println!("  {id}: {component}");
        }
    }

    Ok(())
}
