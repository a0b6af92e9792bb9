// 佩戴率预警与统计命令

use chrono::{Duration, Local};
use crate::commands::Session;
use crate::config;
use crate::error::{AppError, AppResult};

const MAX_STAT_DAYS: i64 = 3650;

/// 列出平均佩戴率低于阈值的工地，默认阈值取配置
pub fn check_warnings(session: &mut Session, threshold: Option<f64>) -> AppResult<String> {
    let threshold = threshold.unwrap_or_else(|| config::get_config().compliance_threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AppError::InvalidArgument(format!("阈值必须在 0 到 1 之间: {}", threshold)));
    }

    let warnings = session.store.get_low_compliance_sites(threshold)?;
    if warnings.is_empty() {
        return Ok(format!("所有工地佩戴率均不低于 {:.0}%", threshold * 100.0));
    }

    let mut lines = vec![format!("以下工地安全帽佩戴率低于 {:.0}%:", threshold * 100.0)];
    for w in &warnings {
        lines.push(format!(
            "工地: {}  负责人: {}  电话: {}  佩戴率: {:.1}%  记录数: {}",
            w.site_name, w.manager_name, w.manager_phone, w.compliance_rate * 100.0, w.total_records
        ));
    }
    Ok(lines.join("\n"))
}

/// 工地最近 days 天的每日统计
pub fn site_statistics(session: &mut Session, site_id: i64, days: i64) -> AppResult<String> {
    if !(1..=MAX_STAT_DAYS).contains(&days) {
        return Err(AppError::InvalidArgument(format!("天数必须在 1 到 {} 之间: {}", MAX_STAT_DAYS, days)));
    }
    let site = session
        .store
        .get_site_by_id(site_id)?
        .ok_or_else(|| AppError::NotFound(format!("工地不存在: {}", site_id)))?;

    let since = Local::now().date_naive() - Duration::days(days - 1);
    let stats = session.store.get_site_statistics(site_id, since)?;
    if stats.is_empty() {
        return Ok(format!("{} 自 {} 起没有检测记录", site.name, since));
    }

    let mut lines = vec![format!("{} 自 {} 起的每日统计:", site.name, since)];
    for day in &stats {
        let rate = day
            .avg_compliance_rate
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "{}  检测 {} 次  总人数 {}  佩戴 {}  未佩戴 {}  平均佩戴率 {}",
            day.date, day.detection_count, day.total_people,
            day.total_with_helmet, day.total_without_helmet, rate
        ));
    }
    Ok(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{sites, testing};
    use crate::utils::HelmetCounts;

    #[test]
    fn test_warnings_use_threshold() {
        let (mut session, _dir) = testing::session(Vec::new());
        sites::add_site(&mut session, "A", "张三", "138").unwrap();
        let now = Local::now().naive_local();
        session.store.add_detection_record(1, HelmetCounts::new(9, 1), "", now).unwrap();
        session.store.add_detection_record(1, HelmetCounts::new(6, 4), "", now).unwrap();

        let text = check_warnings(&mut session, Some(0.8)).unwrap();
        assert!(text.contains("工地: A"));
        assert!(text.contains("75.0%"));
        let text = check_warnings(&mut session, Some(0.7)).unwrap();
        assert!(!text.contains("工地: A"));
        assert!(check_warnings(&mut session, Some(1.5)).is_err());
    }

    #[test]
    fn test_statistics_for_today() {
        let (mut session, _dir) = testing::session(Vec::new());
        sites::add_site(&mut session, "A", "张三", "138").unwrap();
        let now = Local::now().naive_local();
        session.store.add_detection_record(1, HelmetCounts::new(3, 1), "", now).unwrap();
        session.store.add_detection_record(1, HelmetCounts::new(0, 0), "", now).unwrap();

        let text = site_statistics(&mut session, 1, 30).unwrap();
        assert!(text.contains("检测 2 次"));
        assert!(text.contains("75.0%"));
        assert!(site_statistics(&mut session, 1, 0).is_err());
        assert!(matches!(site_statistics(&mut session, 9, 30), Err(AppError::NotFound(_))));
    }
}
