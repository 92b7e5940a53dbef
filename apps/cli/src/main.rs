//! # Triq CLI
//!
//! 三指自适应夹爪命令行工具。
//!
//! ```bash
//! # 激活并等待就绪
//! triq-cli --addr 192.168.1.11:502 activate
//!
//! # 捏取模式半行程抓取
//! triq-cli --addr 192.168.1.11:502 grip --mode pinch --fraction 0.5
//!
//! # 持续监视状态
//! triq-cli --addr 192.168.1.11:502 status --watch
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use triq_client::{GraspMode, GripPhase, GripProfile, Hand};
use triq_transport::TcpTransport;

/// Triq CLI - 自适应夹爪命令行工具
#[derive(Parser, Debug)]
#[command(name = "triq-cli")]
#[command(about = "Command-line interface for triq gripper control", long_about = None)]
#[command(version)]
struct Cli {
    /// 夹爪控制器地址
    #[arg(long, default_value = "192.168.1.11:502")]
    addr: SocketAddr,

    /// 抓取配置文件（TOML），缺省用内置配置
    #[arg(long)]
    profile: Option<PathBuf>,

    /// 等待类操作的超时（秒）
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Basic,
    Pinch,
    Wide,
    Scissor,
}

impl From<ModeArg> for GraspMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Basic => GraspMode::Basic,
            ModeArg::Pinch => GraspMode::Pinch,
            ModeArg::Wide => GraspMode::Wide,
            ModeArg::Scissor => GraspMode::Scissor,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 激活夹爪并等待激活完成
    Activate,

    /// 去激活（手指松弛）
    Deactivate,

    /// 复位（去激活后重新激活），故障恢复用
    Reset,

    /// 闭合抓取并等待结论
    Grip {
        /// 抓取模式
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,

        /// 闭合比例 0.0（全开）..=1.0（全闭）
        #[arg(long, default_value_t = 1.0)]
        fraction: f64,

        /// 全指速度（0..=255）
        #[arg(long)]
        speed: Option<i32>,

        /// 全指力（0..=255）
        #[arg(long)]
        force: Option<i32>,
    },

    /// 移动到原始目标位置（0..=255）
    Goto {
        /// 目标位置（全指统一）
        position: i32,

        /// 全指速度（0..=255）
        #[arg(long)]
        speed: Option<i32>,

        /// 全指力（0..=255）
        #[arg(long)]
        force: Option<i32>,
    },

    /// 张开手指
    Open {
        /// 闭合比例 0.0（全开）..=1.0（全闭）
        #[arg(long, default_value_t = 0.0)]
        fraction: f64,
    },

    /// 停止当前运动（手指保持原位）
    Stop,

    /// 触发自动释放（紧急张开，事后需复位）
    Release,

    /// 查询 / 监视夹爪状态
    Status {
        /// 持续监视，Ctrl-C 退出
        #[arg(long)]
        watch: bool,

        /// 监视刷新频率（Hz）
        #[arg(long, default_value_t = 5)]
        frequency: u32,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "triq_cli=info,triq_driver=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let timeout = Duration::from_secs(cli.timeout);

    let profile = match &cli.profile {
        Some(path) => GripProfile::load(path)
            .with_context(|| format!("Failed to load profile {}", path.display()))?,
        None => GripProfile::default(),
    };

    let transport = TcpTransport::connect(cli.addr, Duration::from_secs(5))
        .with_context(|| format!("Failed to connect to gripper at {}", cli.addr))?;
    let hand = Hand::connect(transport, profile)?;

    match cli.command {
        Commands::Activate => {
            hand.set_parameter("activate", 1)?;
            hand.wait_active(timeout)?;
            println!("Gripper activated");
        },

        Commands::Deactivate => {
            hand.set_parameter("activate", 0)?;
            println!("Gripper deactivated");
        },

        Commands::Reset => {
            hand.reset()?;
            hand.wait_active(timeout)?;
            println!("Gripper reset and reactivated");
        },

        Commands::Grip { mode, fraction, speed, force } => {
            if let Some(mode) = mode {
                hand.set_parameter("grip", GraspMode::from(mode) as i32)?;
                hand.wait_active(timeout)?;
            }
            for axis in triq_client::Axis::FINGERS {
                if let Some(speed) = speed {
                    hand.gripper().set_speed(axis, speed);
                }
                if let Some(force) = force {
                    hand.gripper().set_force(axis, force);
                }
            }
            hand.set_tool(fraction)?;
            let phase = hand.wait_settled(timeout)?;
            report_outcome(phase)?;
        },

        Commands::Goto { position, speed, force } => {
            hand.gripper().set_targets(position, speed, force);
            hand.set_parameter("move", 1)?;
            let phase = hand.wait_settled(timeout)?;
            report_outcome(phase)?;
        },

        Commands::Open { fraction } => {
            hand.set_tool(fraction)?;
            let phase = hand.wait_settled(timeout)?;
            report_outcome(phase)?;
        },

        Commands::Stop => {
            hand.stop_motion()?;
            println!("Motion stopped");
        },

        Commands::Release => {
            hand.set_parameter("auto_release", 1)?;
            println!("Auto-release triggered, reset required afterwards");
        },

        Commands::Status { watch, frequency } => {
            if watch {
                watch_status(&hand, frequency)?;
            } else {
                hand.gripper().refresh()?;
                print_status(&hand);
            }
        },
    }

    Ok(())
}

fn report_outcome(phase: GripPhase) -> Result<()> {
    match phase {
        GripPhase::Grasped => println!("Object grasped"),
        GripPhase::AtTarget => println!("Fingers at requested position, no object"),
        GripPhase::Stalled => println!("Fingers stalled before target"),
        other => bail!("Unexpected final phase: {other:?}"),
    }
    Ok(())
}

fn print_status(hand: &Hand) {
    let view = hand.gripper().view();
    println!("phase: {:?}", view.phase);
    println!("mode:  {:?}", view.status.mode);
    for (name, axis) in [
        ("finger A", triq_client::Axis::FingerA),
        ("finger B", triq_client::Axis::FingerB),
        ("finger C", triq_client::Axis::FingerC),
        ("scissor ", triq_client::Axis::Scissor),
    ] {
        let feedback = view.status.axis(axis);
        println!(
            "{name}: pos {:3} req {:3} cur {:3} det {:?}",
            feedback.position,
            feedback.requested,
            feedback.current,
            view.status.detection(axis),
        );
    }
    println!("fault: {:?}", view.status.fault);
}

fn watch_status(hand: &Hand, frequency: u32) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))
            .context("Failed to install Ctrl-C handler")?;
    }

    let period = Duration::from_secs_f64(1.0 / frequency.max(1) as f64);
    while running.load(Ordering::SeqCst) {
        // 保活线程在持续刷新视图，这里只读快照
        print_status(hand);
        println!("---");
        std::thread::sleep(period);
    }
    Ok(())
}
