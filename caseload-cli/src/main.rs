//! 患者负荷重新分配命令行工具

use anyhow::{bail, Context, Result};
use caseload_admin::{init_logging, ConfigManager, ConsoleConfig};
use caseload_core::{
    CaseId, CaseloadBackend, CaseloadFilter, Category, HandlerId, ReassignmentMode, Shift,
    SlotLabel,
};
use caseload_integration::{HttpBackend, InMemoryBackend};
use caseload_workflow::{BatchOutcome, ReassignmentSession, StatusFilter};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "caseload-cli")]
#[command(about = "患者负荷查看与批量重新分配工具")]
struct Cli {
    /// 配置文件路径
    #[arg(short, long, default_value = "caseload.toml")]
    config: String,

    /// 使用内置示例数据，不连接后端
    #[arg(long)]
    offline: bool,

    /// 日志级别，覆盖配置文件
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 列出负责人的病例及类别汇总
    Roster(RosterArgs),
    /// 显示目标负责人某天的时间段占用
    Slots {
        #[arg(long)]
        handler: HandlerId,
        #[arg(long)]
        date: NaiveDate,
    },
    /// 批量重新分配病例
    Reassign(ReassignArgs),
}

#[derive(Args, Debug)]
struct RosterArgs {
    #[arg(long)]
    handler: HandlerId,
    #[arg(long)]
    date: Option<NaiveDate>,
    /// MANANA 或 TARDE
    #[arg(long)]
    shift: Option<Shift>,
    /// 按姓名或证件号搜索
    #[arg(long)]
    search: Option<String>,
    /// 类别名或 unset
    #[arg(long, value_parser = parse_status_filter)]
    status: Option<StatusFilter>,
    /// 读取哪一类病例列表，默认取配置
    #[arg(long)]
    mode: Option<ReassignmentMode>,
}

#[derive(Args, Debug)]
struct ReassignArgs {
    /// 当前负责人
    #[arg(long)]
    from: HandlerId,
    /// 目标负责人
    #[arg(long)]
    to: HandlerId,
    /// 要移动的病例，逗号分隔
    #[arg(long, value_delimiter = ',', required_unless_present = "all")]
    cases: Vec<CaseId>,
    /// 选择当前列表中的全部病例
    #[arg(long)]
    all: bool,
    /// 筛选当前负责人的病例日期
    #[arg(long)]
    on: Option<NaiveDate>,
    /// handler-only 或 slot-aware，默认取配置
    #[arg(long)]
    mode: Option<ReassignmentMode>,
    /// 目标日期（slot-aware）
    #[arg(long)]
    date: Option<NaiveDate>,
    /// 目标时间段 HH:MM（slot-aware）
    #[arg(long)]
    slot: Option<SlotLabel>,
}

fn parse_status_filter(raw: &str) -> Result<StatusFilter, String> {
    match raw.trim().to_lowercase().as_str() {
        "" | "any" | "all" => Ok(StatusFilter::Any),
        "unset" | "sin-estado" | "none" => Ok(StatusFilter::Unset),
        other => other.parse::<Category>().map(StatusFilter::Category),
    }
}

/// 按模式创建后端，HTTP 后端的读取路由随模式变化
async fn build_backend(
    config: &ConsoleConfig,
    mode: ReassignmentMode,
    offline: bool,
    sample_date: NaiveDate,
) -> Result<Arc<dyn CaseloadBackend>> {
    if offline {
        info!("Using built-in sample data for {}", sample_date);
        return Ok(Arc::new(InMemoryBackend::sample(sample_date).await));
    }
    let backend = HttpBackend::new(config.backend.clone(), mode).context("无法创建HTTP客户端")?;
    Ok(Arc::new(backend))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = ConfigManager::new(&cli.config).context("配置加载失败")?;
    let mut config = manager.get_config().await;
    if let Some(level) = &cli.log_level {
        config.logging.level = level.clone();
    }
    init_logging(&config.logging)?;

    let today = Local::now().date_naive();
    match cli.command {
        Command::Roster(args) => {
            let mode = args.mode.unwrap_or(config.reassignment.mode);
            let backend =
                build_backend(&config, mode, cli.offline, args.date.unwrap_or(today)).await?;
            roster(backend, &config, args).await
        }
        Command::Slots { handler, date } => {
            let backend =
                build_backend(&config, ReassignmentMode::SlotAware, cli.offline, date).await?;
            slots(backend, &config, handler, date).await
        }
        Command::Reassign(args) => {
            let mode = args.mode.unwrap_or(config.reassignment.mode);
            let sample_date = args.on.or(args.date).unwrap_or(today);
            let backend = build_backend(&config, mode, cli.offline, sample_date).await?;
            reassign(backend, &config, mode, args).await
        }
    }
}

async fn roster(backend: Arc<dyn CaseloadBackend>, config: &ConsoleConfig, args: RosterArgs) -> Result<()> {
    let mut filter = CaseloadFilter::for_handler(args.handler);
    filter.date = args.date;
    filter.shift = args.shift;

    let mut session_config = config.reassignment.session_config();
    if let Some(mode) = args.mode {
        session_config.mode = mode;
    }

    let mut session = ReassignmentSession::new(backend, session_config, filter);
    session.refresh().await?;
    if let Some(search) = args.search {
        session.set_search(search);
    }
    if let Some(status) = args.status {
        session.set_status_filter(status);
    }

    for record in session.visible_records() {
        println!(
            "{:>8}  {:<28} {:>10}  {:<10} {}",
            record.case_id,
            record.patient_name,
            record.patient_external_id,
            session.category_of(record),
            record
                .appointment_time
                .map(|t| t.format("%H:%M").to_string())
                .unwrap_or_else(|| "--:--".to_string())
        );
    }

    let counts = session.category_counts();
    println!();
    for category in Category::ALL {
        println!("{:<10} {}", category, counts.get(category));
    }
    println!("共 {} 例，完成率 {:.1}%", counts.total, counts.percent_complete());
    Ok(())
}

async fn slots(
    backend: Arc<dyn CaseloadBackend>,
    config: &ConsoleConfig,
    handler: HandlerId,
    date: NaiveDate,
) -> Result<()> {
    let mut session_config = config.reassignment.session_config();
    session_config.mode = ReassignmentMode::SlotAware;

    let mut session = ReassignmentSession::new(backend, session_config, CaseloadFilter::for_handler(handler));
    session.open_dialog().await?;
    session.choose_destination(Some(handler)).await?;
    session.choose_date(Some(date)).await?;

    let grid = session.slot_grid();
    for cell in &grid.cells {
        println!("{}  {}", cell.label, if cell.occupied { "占用" } else { "空闲" });
    }
    println!("可用 {} / {}", grid.available().count(), grid.cells.len());
    Ok(())
}

async fn reassign(
    backend: Arc<dyn CaseloadBackend>,
    config: &ConsoleConfig,
    mode: ReassignmentMode,
    args: ReassignArgs,
) -> Result<()> {
    let mut session_config = config.reassignment.session_config();
    session_config.mode = mode;
    // 命令行没有成功提示可供停留
    session_config.success_display_delay = std::time::Duration::ZERO;

    let mut filter = CaseloadFilter::for_handler(args.from);
    filter.date = args.on;

    let mut session = ReassignmentSession::new(backend, session_config, filter);
    session.refresh().await?;

    if args.all {
        session.toggle_all_visible();
    } else {
        for case_id in &args.cases {
            if !session.toggle(*case_id) {
                warn!("Case {} is not in the roster of handler {}", case_id, args.from);
            }
        }
    }
    if session.selection().is_empty() {
        bail!("没有可重新分配的病例");
    }

    session.open_dialog().await?;
    session.choose_destination(Some(args.to)).await?;
    if session.mode().requires_slot() {
        session.choose_date(args.date).await?;
        session.choose_slot(args.slot)?;
    }

    let mut progress = session.subscribe_progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            if current.total > 0 {
                info!(
                    "Progress: {}/{} settled ({} failed)",
                    current.settled(),
                    current.total,
                    current.failed
                );
            }
        }
    });

    let outcome = session.commit().await?;
    drop(session);
    let _ = reporter.await;

    print_outcome(&outcome);
    if !outcome.is_success() {
        bail!("{} 例重新分配失败", outcome.progress.failed);
    }
    Ok(())
}

fn print_outcome(outcome: &BatchOutcome) {
    println!(
        "批次 {}: 成功 {}，失败 {}，共 {}",
        outcome.run_id, outcome.progress.succeeded, outcome.progress.failed, outcome.progress.total
    );
    for failure in &outcome.failures {
        println!("  {}", failure);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_filter() {
        assert_eq!(parse_status_filter("unset").unwrap(), StatusFilter::Unset);
        assert_eq!(parse_status_filter("").unwrap(), StatusFilter::Any);
        assert_eq!(
            parse_status_filter("seen").unwrap(),
            StatusFilter::Category(Category::Seen)
        );
        assert!(parse_status_filter("bogus").is_err());
    }

    #[test]
    fn test_cli_parses_reassign() {
        let cli = Cli::try_parse_from([
            "caseload-cli",
            "--offline",
            "reassign",
            "--from",
            "1",
            "--to",
            "2",
            "--cases",
            "101,103",
            "--mode",
            "slot-aware",
            "--date",
            "2025-03-10",
            "--slot",
            "11:30",
        ])
        .unwrap();
        assert!(cli.offline);
        match cli.command {
            Command::Reassign(args) => {
                assert_eq!(args.cases, vec![101, 103]);
                assert_eq!(args.mode, Some(ReassignmentMode::SlotAware));
                assert_eq!(args.slot.map(|s| s.to_string()), Some("11:30".to_string()));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
