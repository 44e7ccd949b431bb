//! 重新分配演示程序
//!
//! 使用内存后端展示病例筛选、类别汇总、时间段占用、批量提交和部分失败的处理

use caseload_core::{CaseloadFilter, Category, ReassignmentMode, SlotLabel};
use caseload_integration::InMemoryBackend;
use caseload_workflow::{ReassignmentSession, SessionConfig, StatusFilter};
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt::init();

    let day = NaiveDate::from_ymd_opt(2025, 3, 10).ok_or_else(|| anyhow::anyhow!("invalid date"))?;
    let backend = Arc::new(InMemoryBackend::sample(day).await.with_latency(Duration::from_millis(20)));

    println!("🚀 患者负荷重新分配演示\n");

    // 1. 读取负责人 1 当天的病例
    let mut session = ReassignmentSession::new(
        backend.clone(),
        SessionConfig {
            success_display_delay: Duration::from_millis(300),
            ..SessionConfig::new(ReassignmentMode::SlotAware)
        },
        CaseloadFilter::for_handler(1).on(day),
    );
    session.refresh().await?;

    let counts = session.category_counts();
    println!("📋 负责人 1 共 {} 例，完成率 {:.1}%", counts.total, counts.percent_complete());
    for category in Category::ALL {
        println!("   {:<10} {}", category, counts.get(category));
    }

    // 2. 选择所有待处理的病例
    session.set_status_filter(StatusFilter::Category(Category::Pending));
    session.toggle_all_visible();
    session.set_status_filter(StatusFilter::Any);
    println!("\n✅ 已选择 {} 例: {:?}", session.selection().len(), session.selection().ids());

    // 3. 打开对话框，查看目标负责人的时间段
    session.open_dialog().await?;
    for handler in session.directory() {
        println!("   👩‍⚕️ {} {}", handler.id, handler.display_name);
    }
    session.choose_destination(Some(2)).await?;
    session.choose_date(Some(day)).await?;

    let grid = session.slot_grid();
    let taken: Vec<String> = grid
        .cells
        .iter()
        .filter(|cell| cell.occupied)
        .map(|cell| cell.label.to_string())
        .collect();
    println!("\n🕘 负责人 2 在 {} 已占用: {:?}", day, taken);

    if let Err(e) = session.choose_slot(SlotLabel::from_hm(9, 0)) {
        println!("   ⚠️ {}", e);
    }
    let free = grid.available().nth(4);
    session.choose_slot(free)?;
    println!("   选择时间段 {:?}", free.map(|slot| slot.to_string()));

    // 4. 提交整批
    let outcome = session.commit().await?;
    println!(
        "\n📦 批次 {}: 成功 {}，失败 {}，共 {}",
        outcome.run_id, outcome.progress.succeeded, outcome.progress.failed, outcome.progress.total
    );
    println!("   对话框已关闭: {}", !session.is_dialog_open());

    // 5. 逐个提交，其中一个病例被锁定
    backend.lock_case(105).await;
    let mut per_case = ReassignmentSession::new(
        backend.clone(),
        SessionConfig {
            success_display_delay: Duration::ZERO,
            ..SessionConfig::new(ReassignmentMode::HandlerOnly)
        },
        CaseloadFilter::for_handler(1),
    );
    per_case.refresh().await?;
    per_case.toggle_all_visible();
    per_case.open_dialog().await?;
    per_case.choose_destination(Some(3)).await?;

    let mut progress = per_case.subscribe_progress();
    let reporter = tokio::spawn(async move {
        while progress.changed().await.is_ok() {
            let current = *progress.borrow_and_update();
            if current.total > 0 {
                tracing::info!("Per-case progress: {}/{} settled", current.settled(), current.total);
            }
        }
    });

    let outcome = per_case.commit().await?;
    println!(
        "\n📦 逐个提交: 成功 {}，失败 {}，共 {}",
        outcome.progress.succeeded, outcome.progress.failed, outcome.progress.total
    );
    for failure in &outcome.failures {
        println!("   ❌ {}", failure);
    }

    per_case.refresh().await?;
    println!("   仍需处理: {:?}", per_case.selection().ids());
    drop(per_case);
    let _ = reporter.await;

    println!("\n🎉 演示完成");
    Ok(())
}
