// 数据库模块
//
// 工地信息与检测记录的持久化。连接由 Store 独占，随 Store 释放而关闭；
// 同一时刻只有一个调用方，不做跨线程共享。

use rusqlite::{Connection, OptionalExtension, Row, ToSql, params, params_from_iter};
use std::path::Path;
use chrono::{NaiveDate, NaiveDateTime};
use tracing::{debug, info};
use crate::error::{AppError, AppResult};
use crate::utils::{
    ComplianceWarning, DailyStatistics, DetectionRecord, HelmetCounts, RecordFilter,
    RecordWithSite, Site,
};

const RECORD_COLUMNS: &str =
    "dr.id, dr.site_id, dr.detection_time, dr.total_people, dr.with_helmet, dr.without_helmet, dr.image_path";

pub struct Store {
    conn: Connection,
}

impl Store {
    /// 打开数据库文件，表不存在时创建
    pub fn open(db_path: &Path) -> AppResult<Self> {
        info!("[STORE] 打开数据库: {}", db_path.display());
        let conn = Connection::open(db_path)?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.create_tables()?;
        Ok(store)
    }

    fn create_tables(&self) -> AppResult<()> {
        // 工地信息表
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS construction_sites (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_name TEXT NOT NULL,
                manager_name TEXT,
                manager_phone TEXT
            )",
            [],
        )?;

        // 检测记录表
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS detection_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                site_id INTEGER,
                detection_time TIMESTAMP,
                total_people INTEGER,
                with_helmet INTEGER,
                without_helmet INTEGER,
                image_path TEXT,
                FOREIGN KEY (site_id) REFERENCES construction_sites(id)
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_site ON detection_records(site_id)",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_records_time ON detection_records(detection_time)",
            [],
        )?;

        Ok(())
    }

    // ==================== 工地操作 ====================

    /// 添加工地
    pub fn add_site(&self, name: &str, manager_name: &str, manager_phone: &str) -> AppResult<i64> {
        self.conn.execute(
            "INSERT INTO construction_sites (site_name, manager_name, manager_phone) VALUES (?1, ?2, ?3)",
            params![name, manager_name, manager_phone],
        )?;
        let id = self.conn.last_insert_rowid();
        info!("[STORE] 新增工地: id={}, name={}", id, name);
        Ok(id)
    }

    /// 更新工地信息
    pub fn update_site(&self, id: i64, name: &str, manager_name: &str, manager_phone: &str) -> AppResult<()> {
        let changed = self.conn.execute(
            "UPDATE construction_sites SET site_name = ?1, manager_name = ?2, manager_phone = ?3 WHERE id = ?4",
            params![name, manager_name, manager_phone, id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("工地不存在: {}", id)));
        }
        Ok(())
    }

    /// 删除工地，先删除其下所有检测记录
    pub fn delete_site(&self, id: i64) -> AppResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        let records = tx.execute("DELETE FROM detection_records WHERE site_id = ?1", [id])?;
        let sites = tx.execute("DELETE FROM construction_sites WHERE id = ?1", [id])?;
        if sites == 0 {
            // tx 在此处被丢弃，自动回滚
            return Err(AppError::NotFound(format!("工地不存在: {}", id)));
        }
        tx.commit()?;
        info!("[STORE] 删除工地: id={}, 连带删除记录 {} 条", id, records);
        Ok(())
    }

    /// 获取所有工地，按名称排序
    pub fn get_sites(&self) -> AppResult<Vec<Site>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, site_name, manager_name, manager_phone FROM construction_sites ORDER BY site_name"
        )?;
        let sites = stmt
            .query_map([], site_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sites)
    }

    pub fn get_site_by_id(&self, id: i64) -> AppResult<Option<Site>> {
        let site = self.conn.query_row(
            "SELECT id, site_name, manager_name, manager_phone FROM construction_sites WHERE id = ?1",
            [id],
            site_from_row,
        ).optional()?;
        Ok(site)
    }

    /// 按名称精确查找
    pub fn get_site_by_name(&self, name: &str) -> AppResult<Option<Site>> {
        let site = self.conn.query_row(
            "SELECT id, site_name, manager_name, manager_phone FROM construction_sites WHERE site_name = ?1
             ORDER BY id LIMIT 1",
            [name],
            site_from_row,
        ).optional()?;
        Ok(site)
    }

    // ==================== 检测记录操作 ====================

    /// 添加检测记录
    pub fn add_detection_record(
        &self,
        site_id: i64,
        counts: HelmetCounts,
        image_path: &str,
        detected_at: NaiveDateTime,
    ) -> AppResult<i64> {
        self.conn.execute(
            "INSERT INTO detection_records
             (site_id, detection_time, total_people, with_helmet, without_helmet, image_path)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                site_id,
                detected_at,
                counts.total(),
                counts.with_helmet,
                counts.without_helmet,
                image_path,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(
            "[STORE] 新增记录: id={}, site_id={}, total={}, with={}, without={}",
            id, site_id, counts.total(), counts.with_helmet, counts.without_helmet
        );
        Ok(id)
    }

    /// 更新检测记录，总人数由两类人数重新计算
    pub fn update_record(&self, id: i64, site_id: i64, counts: HelmetCounts) -> AppResult<()> {
        let changed = self.conn.execute(
            "UPDATE detection_records
             SET site_id = ?1, total_people = ?2, with_helmet = ?3, without_helmet = ?4
             WHERE id = ?5",
            params![site_id, counts.total(), counts.with_helmet, counts.without_helmet, id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("检测记录不存在: {}", id)));
        }
        Ok(())
    }

    /// 删除检测记录，返回对应的图片路径，由调用方决定是否删除文件
    pub fn delete_record(&self, id: i64) -> AppResult<String> {
        let image_path: Option<Option<String>> = self.conn.query_row(
            "SELECT image_path FROM detection_records WHERE id = ?1",
            [id],
            |row| row.get(0),
        ).optional()?;

        let image_path = match image_path {
            Some(path) => path.unwrap_or_default(),
            None => return Err(AppError::NotFound(format!("检测记录不存在: {}", id))),
        };

        self.conn.execute("DELETE FROM detection_records WHERE id = ?1", [id])?;
        info!("[STORE] 删除记录: id={}", id);
        Ok(image_path)
    }

    pub fn get_record_by_id(&self, id: i64) -> AppResult<Option<DetectionRecord>> {
        let sql = format!("SELECT {} FROM detection_records dr WHERE dr.id = ?1", RECORD_COLUMNS);
        let record = self.conn.query_row(&sql, [id], record_from_row).optional()?;
        Ok(record)
    }

    /// 按工地 ID 和日期范围获取记录，最新的在前
    pub fn get_records(
        &self,
        site_id: Option<i64>,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> AppResult<Vec<DetectionRecord>> {
        let mut sql = format!("SELECT {} FROM detection_records dr WHERE 1=1", RECORD_COLUMNS);
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(site_id) = site_id {
            sql.push_str(" AND dr.site_id = ?");
            args.push(Box::new(site_id));
        }
        push_date_range(&mut sql, &mut args, start_date, end_date);
        sql.push_str(" ORDER BY dr.detection_time DESC, dr.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(params_from_iter(args.iter()), record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// 支持按工地名称模糊查询的记录获取方法
    pub fn get_records_with_site_name(&self, filter: &RecordFilter) -> AppResult<Vec<RecordWithSite>> {
        let mut sql = format!(
            "SELECT {}, cs.site_name, cs.manager_name, cs.manager_phone
             FROM detection_records dr
             JOIN construction_sites cs ON dr.site_id = cs.id
             WHERE 1=1",
            RECORD_COLUMNS
        );
        let mut args: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(name) = filter.site_name.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            sql.push_str(" AND cs.site_name LIKE ? ESCAPE '\\'");
            args.push(Box::new(format!("%{}%", escape_like(name))));
        }
        push_date_range(&mut sql, &mut args, filter.start_date, filter.end_date);
        sql.push_str(" ORDER BY dr.detection_time DESC, dr.id DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(RecordWithSite {
                    record: record_from_row(row)?,
                    site_name: row.get(7)?,
                    manager_name: row.get::<_, Option<String>>(8)?.unwrap_or_default(),
                    manager_phone: row.get::<_, Option<String>>(9)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// 获取安全帽佩戴率低于阈值的工地，按佩戴率升序
    ///
    /// 总人数为 0 的记录不参与平均；全部记录都为 0 人的工地没有佩戴率，不会出现在结果中
    pub fn get_low_compliance_sites(&self, threshold: f64) -> AppResult<Vec<ComplianceWarning>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                cs.id,
                cs.site_name,
                cs.manager_name,
                cs.manager_phone,
                COUNT(*) AS total_records,
                AVG(CASE WHEN dr.total_people > 0
                         THEN CAST(dr.with_helmet AS REAL) / dr.total_people END) AS compliance_rate
             FROM detection_records dr
             JOIN construction_sites cs ON dr.site_id = cs.id
             GROUP BY cs.id
             HAVING compliance_rate IS NOT NULL AND compliance_rate < ?1
             ORDER BY compliance_rate ASC"
        )?;

        let warnings = stmt
            .query_map([threshold], |row| {
                Ok(ComplianceWarning {
                    site_id: row.get(0)?,
                    site_name: row.get(1)?,
                    manager_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    manager_phone: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                    total_records: row.get(4)?,
                    compliance_rate: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(warnings)
    }

    /// 获取指定工地自 since 起每天的统计数据
    pub fn get_site_statistics(&self, site_id: i64, since: NaiveDate) -> AppResult<Vec<DailyStatistics>> {
        let mut stmt = self.conn.prepare(
            "SELECT
                date(detection_time) AS day,
                COUNT(*) AS detection_count,
                AVG(CASE WHEN total_people > 0
                         THEN CAST(with_helmet AS REAL) / total_people END) AS avg_compliance_rate,
                SUM(total_people),
                SUM(with_helmet),
                SUM(without_helmet)
             FROM detection_records
             WHERE site_id = ?1 AND date(detection_time) >= ?2
             GROUP BY day
             ORDER BY day ASC"
        )?;

        let stats = stmt
            .query_map(params![site_id, since], |row| {
                Ok(DailyStatistics {
                    date: row.get(0)?,
                    detection_count: row.get(1)?,
                    avg_compliance_rate: row.get(2)?,
                    total_people: row.get(3)?,
                    total_with_helmet: row.get(4)?,
                    total_without_helmet: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(stats)
    }
}

fn site_from_row(row: &Row<'_>) -> rusqlite::Result<Site> {
    Ok(Site {
        id: row.get(0)?,
        name: row.get(1)?,
        manager_name: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
        manager_phone: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
    })
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<DetectionRecord> {
    Ok(DetectionRecord {
        id: row.get(0)?,
        site_id: row.get(1)?,
        detection_time: row.get(2)?,
        total_people: row.get(3)?,
        with_helmet: row.get(4)?,
        without_helmet: row.get(5)?,
        image_path: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
    })
}

fn push_date_range(
    sql: &mut String,
    args: &mut Vec<Box<dyn ToSql>>,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
) {
    if let Some(start) = start_date {
        sql.push_str(" AND date(dr.detection_time) >= ?");
        args.push(Box::new(start));
    }
    if let Some(end) = end_date {
        sql.push_str(" AND date(dr.detection_time) <= ?");
        args.push(Box::new(end));
    }
}

/// 转义 LIKE 通配符，使用户输入按字面匹配
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(h, 0, 0).unwrap()
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_schema_creation_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let store = Store::open(&path).unwrap();
            store.add_site("A", "张三", "123").unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.get_sites().unwrap().len(), 1);
    }

    #[test]
    fn test_site_round_trip_by_name() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_site("东区工地", "李四", "13800000000").unwrap();
        let site = store.get_site_by_name("东区工地").unwrap().unwrap();
        assert_eq!(site.id, id);
        assert_eq!(site.manager_name, "李四");
        assert_eq!(site.manager_phone, "13800000000");
        assert!(store.get_site_by_name("东区").unwrap().is_none());
    }

    #[test]
    fn test_sites_sorted_by_name() {
        let store = Store::open_in_memory().unwrap();
        store.add_site("B", "m", "p").unwrap();
        store.add_site("A", "m", "p").unwrap();
        let names: Vec<_> = store.get_sites().unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_update_site() {
        let store = Store::open_in_memory().unwrap();
        let id = store.add_site("A", "m", "p").unwrap();
        store.update_site(id, "A2", "m2", "p2").unwrap();
        let site = store.get_site_by_id(id).unwrap().unwrap();
        assert_eq!(site.name, "A2");
        assert_eq!(site.manager_phone, "p2");
        assert!(matches!(store.update_site(999, "x", "y", "z"), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_delete_site_removes_its_records() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("A", "m", "p").unwrap();
        let b = store.add_site("B", "m", "p").unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 1), "a1.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(2, 0), "a2.jpg", at(2024, 1, 2, 9)).unwrap();
        store.add_detection_record(b, HelmetCounts::new(3, 0), "b1.jpg", at(2024, 1, 2, 9)).unwrap();

        store.delete_site(a).unwrap();

        assert!(store.get_records(Some(a), None, None).unwrap().is_empty());
        assert!(store.get_site_by_id(a).unwrap().is_none());
        assert_eq!(store.get_records(Some(b), None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_delete_missing_site_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.delete_site(42), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_record_total_is_written_from_counts() {
        let store = Store::open_in_memory().unwrap();
        let site = store.add_site("A", "m", "p").unwrap();
        let id = store.add_detection_record(site, HelmetCounts::new(4, 2), "x.jpg", at(2024, 1, 1, 9)).unwrap();
        let record = store.get_record_by_id(id).unwrap().unwrap();
        assert_eq!(record.total_people, 6);
        assert_eq!(record.total_people, record.with_helmet + record.without_helmet);

        store.update_record(id, site, HelmetCounts::new(1, 1)).unwrap();
        let record = store.get_record_by_id(id).unwrap().unwrap();
        assert_eq!(record.total_people, 2);
        assert_eq!(record.detection_time, at(2024, 1, 1, 9));
    }

    #[test]
    fn test_delete_record_returns_image_path() {
        let store = Store::open_in_memory().unwrap();
        let site = store.add_site("A", "m", "p").unwrap();
        let id = store.add_detection_record(site, HelmetCounts::new(1, 0), "captured/x.jpg", at(2024, 1, 1, 9)).unwrap();
        assert_eq!(store.delete_record(id).unwrap(), "captured/x.jpg");
        assert!(store.get_record_by_id(id).unwrap().is_none());
        assert!(matches!(store.delete_record(id), Err(AppError::NotFound(_))));
    }

    #[test]
    fn test_default_query_returns_all_newest_first() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("A", "m", "p").unwrap();
        let b = store.add_site("B", "m", "p").unwrap();
        let first = store.add_detection_record(a, HelmetCounts::new(1, 0), "1.jpg", at(2024, 1, 1, 9)).unwrap();
        let third = store.add_detection_record(b, HelmetCounts::new(1, 0), "3.jpg", at(2024, 1, 3, 9)).unwrap();
        let second = store.add_detection_record(a, HelmetCounts::new(1, 0), "2.jpg", at(2024, 1, 2, 9)).unwrap();

        let ids: Vec<_> = store
            .get_records_with_site_name(&RecordFilter::default())
            .unwrap()
            .into_iter()
            .map(|r| r.record.id)
            .collect();
        assert_eq!(ids, vec![third, second, first]);
    }

    #[test]
    fn test_site_name_filter_is_partial_and_case_insensitive() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("North Yard", "m", "p").unwrap();
        let b = store.add_site("South Yard", "m", "p").unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 0), "1.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(b, HelmetCounts::new(1, 0), "2.jpg", at(2024, 1, 1, 9)).unwrap();

        let filter = RecordFilter { site_name: Some("north".into()), ..Default::default() };
        let rows = store.get_records_with_site_name(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].site_name, "North Yard");

        let filter = RecordFilter { site_name: Some("YARD".into()), ..Default::default() };
        assert_eq!(store.get_records_with_site_name(&filter).unwrap().len(), 2);
    }

    #[test]
    fn test_like_wildcards_match_literally() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("100% safe", "m", "p").unwrap();
        let b = store.add_site("1000 safe", "m", "p").unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 0), "1.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(b, HelmetCounts::new(1, 0), "2.jpg", at(2024, 1, 1, 9)).unwrap();

        let filter = RecordFilter { site_name: Some("100%".into()), ..Default::default() };
        let rows = store.get_records_with_site_name(&filter).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.site_id, a);
    }

    #[test]
    fn test_date_range_is_inclusive() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("A", "m", "p").unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 0), "1.jpg", at(2024, 1, 1, 23)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 0), "2.jpg", at(2024, 1, 2, 0)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 0), "3.jpg", at(2024, 1, 3, 23)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 0), "4.jpg", at(2024, 1, 4, 0)).unwrap();

        let filter = RecordFilter {
            site_name: None,
            start_date: Some(date(2024, 1, 2)),
            end_date: Some(date(2024, 1, 3)),
        };
        let paths: Vec<_> = store
            .get_records_with_site_name(&filter)
            .unwrap()
            .into_iter()
            .map(|r| r.record.image_path)
            .collect();
        assert_eq!(paths, vec!["3.jpg", "2.jpg"]);

        let by_site = store.get_records(Some(a), Some(date(2024, 1, 3)), None).unwrap();
        assert_eq!(by_site.len(), 2);
    }

    #[test]
    fn test_compliance_example_from_two_records() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("A", "王五", "555").unwrap();
        store.add_detection_record(a, HelmetCounts::new(9, 1), "1.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(6, 4), "2.jpg", at(2024, 1, 1, 10)).unwrap();

        let warnings = store.get_low_compliance_sites(0.8).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].site_name, "A");
        assert_eq!(warnings[0].total_records, 2);
        assert!((warnings[0].compliance_rate - 0.75).abs() < 1e-9);

        assert!(store.get_low_compliance_sites(0.7).unwrap().is_empty());
    }

    #[test]
    fn test_compliance_threshold_is_strict_and_sorted() {
        let store = Store::open_in_memory().unwrap();
        let good = store.add_site("good", "m", "p").unwrap();
        let bad = store.add_site("bad", "m", "p").unwrap();
        let worse = store.add_site("worse", "m", "p").unwrap();
        store.add_detection_record(good, HelmetCounts::new(8, 2), "g.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(bad, HelmetCounts::new(7, 3), "b.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(worse, HelmetCounts::new(1, 3), "w.jpg", at(2024, 1, 1, 9)).unwrap();

        let names: Vec<_> = store
            .get_low_compliance_sites(0.8)
            .unwrap()
            .into_iter()
            .map(|w| w.site_name)
            .collect();
        assert_eq!(names, vec!["worse", "bad"]);
    }

    #[test]
    fn test_zero_total_records_are_excluded_from_mean() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("A", "m", "p").unwrap();
        let empty = store.add_site("empty", "m", "p").unwrap();
        store.add_detection_record(a, HelmetCounts::new(9, 1), "1.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(a, HelmetCounts::default(), "2.jpg", at(2024, 1, 1, 10)).unwrap();
        store.add_detection_record(empty, HelmetCounts::default(), "3.jpg", at(2024, 1, 1, 10)).unwrap();

        // A 的均值只由 (9,1) 决定，为 0.9
        assert!(store.get_low_compliance_sites(0.85).unwrap().is_empty());
        let warnings = store.get_low_compliance_sites(0.95).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].site_id, a);
        assert!((warnings[0].compliance_rate - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_site_statistics_grouped_by_day() {
        let store = Store::open_in_memory().unwrap();
        let a = store.add_site("A", "m", "p").unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 1), "0.jpg", at(2023, 12, 1, 9)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(4, 0), "1.jpg", at(2024, 1, 1, 9)).unwrap();
        store.add_detection_record(a, HelmetCounts::new(1, 1), "2.jpg", at(2024, 1, 1, 15)).unwrap();
        store.add_detection_record(a, HelmetCounts::default(), "3.jpg", at(2024, 1, 2, 9)).unwrap();

        let stats = store.get_site_statistics(a, date(2024, 1, 1)).unwrap();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].date, date(2024, 1, 1));
        assert_eq!(stats[0].detection_count, 2);
        assert_eq!(stats[0].total_people, 6);
        assert_eq!(stats[0].total_with_helmet, 5);
        assert!((stats[0].avg_compliance_rate.unwrap() - 0.75).abs() < 1e-9);
        assert_eq!(stats[1].avg_compliance_rate, None);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("a_b%c\\"), "a\\_b\\%c\\\\");
    }
}
