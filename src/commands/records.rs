// 检测记录命令

use std::fs;
use std::path::Path;
use chrono::{Local, NaiveDate};
use tracing::{info, warn};
use crate::commands::Session;
use crate::error::{AppError, AppResult};
use crate::utils::{capture_file_name, HelmetCounts, RecordFilter, MAX_RECORD_PEOPLE};

/// 保存当前检测结果：写截图，再插入记录
///
/// 没选工地、没有检测结果、检测结果全为 0 时给出提示，不做任何修改
pub fn save_record(session: &mut Session) -> AppResult<String> {
    let site = session
        .selected_site
        .clone()
        .ok_or_else(|| AppError::Warning("请先选择工地".to_string()))?;

    let detection = session
        .current
        .as_ref()
        .ok_or_else(|| AppError::Warning("没有可用的检测结果".to_string()))?;
    if detection.counts.is_empty() {
        return Err(AppError::Warning("没有有效的检测结果".to_string()));
    }
    let frame = detection
        .annotated_frame
        .as_ref()
        .ok_or_else(|| AppError::Warning("没有可用的检测结果".to_string()))?;
    let counts = detection.counts;

    if session.store.get_site_by_id(site.id)?.is_none() {
        session.selected_site = None;
        return Err(AppError::Warning("请先选择工地".to_string()));
    }

    fs::create_dir_all(&session.capture_dir)?;
    let now = Local::now().naive_local();
    let image_path = session.capture_dir.join(capture_file_name(now));
    frame.save(&image_path)?;

    let image_path = image_path.to_string_lossy().to_string();
    let id = session.store.add_detection_record(site.id, counts, &image_path, now)?;
    info!("[RECORDS] 保存记录: id={}, site={}, image={}", id, site.name, image_path);

    Ok(format!(
        "检测记录已保存 (#{})\n工地: {}\n总人数: {}\n佩戴安全帽: {}\n未佩戴安全帽: {}",
        id, site.name, counts.total(), counts.with_helmet, counts.without_helmet
    ))
}

/// 查询记录，显示每条记录的佩戴率
pub fn query_records(
    session: &mut Session,
    site: Option<String>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> AppResult<String> {
    if let (Some(from), Some(to)) = (from, to) {
        if from > to {
            return Err(AppError::InvalidArgument(format!("起始日期 {} 晚于结束日期 {}", from, to)));
        }
    }

    let filter = RecordFilter { site_name: site, start_date: from, end_date: to };
    let rows = session.store.get_records_with_site_name(&filter)?;
    if rows.is_empty() {
        return Ok("没有符合条件的记录".to_string());
    }

    let mut lines = vec![format!(
        "{:<6} {:<20} {:<20} {:>6} {:>6} {:>6} {:>8}",
        "ID", "工地", "时间", "总数", "佩戴", "未佩戴", "佩戴率"
    )];
    for row in &rows {
        let r = &row.record;
        lines.push(format!(
            "{:<6} {:<20} {:<20} {:>6} {:>6} {:>6} {:>7.1}%",
            r.id,
            row.site_name,
            r.detection_time.format("%Y-%m-%d %H:%M:%S"),
            r.total_people,
            r.with_helmet,
            r.without_helmet,
            r.counts().compliance_rate() * 100.0
        ));
    }
    lines.push(format!("共 {} 条", rows.len()));
    Ok(lines.join("\n"))
}

/// 修改记录的人数（可同时改工地），总人数重新计算
pub fn edit_record(
    session: &mut Session,
    id: i64,
    site_id: Option<i64>,
    with_helmet: u32,
    without_helmet: u32,
) -> AppResult<String> {
    let counts = HelmetCounts::checked(with_helmet, without_helmet).ok_or_else(|| {
        AppError::InvalidArgument(format!("总人数不能超过 {}", MAX_RECORD_PEOPLE))
    })?;
    let record = session
        .store
        .get_record_by_id(id)?
        .ok_or_else(|| AppError::NotFound(format!("检测记录不存在: {}", id)))?;

    let site_id = site_id.unwrap_or(record.site_id);
    if session.store.get_site_by_id(site_id)?.is_none() {
        return Err(AppError::NotFound(format!("工地不存在: {}", site_id)));
    }

    session.store.update_record(id, site_id, counts)?;
    Ok(format!(
        "记录更新成功 (#{}): 总数 {}，佩戴 {}，未佩戴 {}",
        id, counts.total(), counts.with_helmet, counts.without_helmet
    ))
}

/// 删除记录后再删除截图；截图删除失败只记日志
pub fn delete_record(session: &mut Session, id: i64) -> AppResult<String> {
    let image_path = session.store.delete_record(id)?;

    if !image_path.is_empty() {
        match fs::remove_file(&image_path) {
            Ok(()) => info!("[RECORDS] 已删除截图: {}", image_path),
            Err(e) => warn!("[RECORDS] 删除截图失败 {}: {}", image_path, e),
        }
    }
    Ok(format!("记录已删除 (#{})", id))
}

/// 查看记录对应的截图
pub fn view_image(session: &mut Session, id: i64) -> AppResult<String> {
    let record = session
        .store
        .get_record_by_id(id)?
        .ok_or_else(|| AppError::NotFound(format!("检测记录不存在: {}", id)))?;

    let path = Path::new(&record.image_path);
    if record.image_path.is_empty() || !path.exists() {
        return Err(AppError::Warning(format!("图片文件不存在: {}", record.image_path)));
    }

    let (w, h) = image::image_dimensions(path)
        .map_err(|e| AppError::Warning(format!("无法加载图片 {}: {}", record.image_path, e)))?;
    Ok(format!(
        "记录 #{} {}\n图片: {} ({}x{})",
        id,
        record.detection_time.format("%Y-%m-%d %H:%M:%S"),
        record.image_path,
        w,
        h
    ))
}
