// 工地命令

use tracing::info;
use crate::commands::Session;
use crate::error::{AppError, AppResult};
use crate::utils::Site;

fn format_site(site: &Site) -> String {
    format!("[{}] {}  负责人: {}  电话: {}", site.id, site.name, site.manager_name, site.manager_phone)
}

fn require_fields(name: &str, manager: &str, phone: &str) -> AppResult<(String, String, String)> {
    let (name, manager, phone) = (name.trim(), manager.trim(), phone.trim());
    if name.is_empty() || manager.is_empty() || phone.is_empty() {
        return Err(AppError::Warning("请填写完整信息".to_string()));
    }
    Ok((name.to_string(), manager.to_string(), phone.to_string()))
}

/// 列出工地
pub fn list_sites(session: &mut Session) -> AppResult<String> {
    let sites = session.store.get_sites()?;
    if sites.is_empty() {
        return Ok("还没有工地，使用 add-site 添加".to_string());
    }

    let selected = session.selected_site.as_ref().map(|s| s.id);
    Ok(sites
        .iter()
        .map(|s| {
            let mark = if Some(s.id) == selected { "*" } else { " " };
            format!("{} {}", mark, format_site(s))
        })
        .collect::<Vec<_>>()
        .join("\n"))
}

/// 添加工地，三项信息都必须填写
pub fn add_site(session: &mut Session, name: &str, manager: &str, phone: &str) -> AppResult<String> {
    let (name, manager, phone) = require_fields(name, manager, phone)?;
    let id = session.store.add_site(&name, &manager, &phone)?;
    info!("[SITES] 添加工地: id={}, name={}", id, name);
    Ok(format!("工地信息添加成功: [{}] {}", id, name))
}

pub fn update_site(session: &mut Session, id: i64, name: &str, manager: &str, phone: &str) -> AppResult<String> {
    let (name, manager, phone) = require_fields(name, manager, phone)?;
    session.store.update_site(id, &name, &manager, &phone)?;

    if let Some(selected) = session.selected_site.as_mut().filter(|s| s.id == id) {
        selected.name = name.clone();
        selected.manager_name = manager;
        selected.manager_phone = phone;
    }
    Ok(format!("工地已更新: [{}] {}", id, name))
}

/// 删除工地，连同它的检测记录
pub fn delete_site(session: &mut Session, id: i64) -> AppResult<String> {
    let record_count = session.store.get_records(Some(id), None, None)?.len();
    session.store.delete_site(id)?;
    if session.selected_site.as_ref().map(|s| s.id) == Some(id) {
        session.selected_site = None;
    }
    info!("[SITES] 删除工地: id={}, 记录 {} 条", id, record_count);
    Ok(format!("工地 {} 及其 {} 条检测记录已删除", id, record_count))
}

/// 选择工地，参数为纯数字时先按 ID 查找，找不到再按名称
pub fn use_site(session: &mut Session, key: &str) -> AppResult<String> {
    let key = key.trim();
    let by_id = match key.parse::<i64>() {
        Ok(id) => session.store.get_site_by_id(id)?,
        Err(_) => None,
    };
    let site = match by_id {
        Some(site) => site,
        None => session
            .store
            .get_site_by_name(key)?
            .ok_or_else(|| AppError::NotFound(format!("工地不存在: {}", key)))?,
    };

    let text = format!("当前工地: {}", format_site(&site));
    session.selected_site = Some(site);
    Ok(text)
}
