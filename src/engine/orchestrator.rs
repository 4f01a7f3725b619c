// ==========================================
// 数据值导入系统 - 导入编排器
// ==========================================
// 职责: 驱动记录流经过 解析 → 校验 → 批量写入，应用策略并汇总
// 流程: 生效策略 → 集合级元数据 → 缓存预热 → 逐条处理 → 刷写 → 完成登记 → 汇总
// 红线: 记录级问题只记冲突；结构性 / 持久化失败以 ERROR 汇总返回
// ==========================================

use crate::config::import_options::{EffectivePolicy, ImportOptions};
use crate::config::settings_manager::SettingsManager;
use crate::domain::category::CategoryOptionCombo;
use crate::domain::data_value::{trim_to_none, DataValueSetHeader, ImportConflict, ImportCount, ImportSummary};
use crate::domain::metadata::{DataSet, OrganisationUnit, Period};
use crate::engine::batch_upserter::BatchUpserter;
use crate::engine::collaborators::{
    CurrentUserProvider, DataValueStore, MetadataLookup, PathHierarchyOracle,
    RegistrationStore,
};
use crate::engine::completion::{CompletionHandler, CompletionOutcome, CompletionRequest};
use crate::engine::events::{NoOpNotifier, NotificationLevel, Notifier, TaskId};
use crate::engine::metadata_resolver::MetadataResolver;
use crate::engine::record_validator::{parse_timestamp, RecordOutcome, RecordValidator, ValidationContext};
use crate::engine::summary::ImportAccumulator;
use crate::engine::value_validation::DefaultValueValidator;
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::source::DataValueSource;
use chrono::{Local, NaiveDate};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};

/// 每处理多少条记录上报一次进度
const PROGRESS_INTERVAL: usize = 10_000;

// ==========================================
// PreparedImport - 流读取前确定的上下文
// ==========================================
struct PreparedImport {
    policy: EffectivePolicy,
    resolver: MetadataResolver,
    data_set: Option<DataSet>,
    period: Option<Period>,
    org_unit: Option<OrganisationUnit>,
    attribute_option_combo: Option<CategoryOptionCombo>,
    complete_date: Option<String>,
    username: String,
    user_roots: Vec<String>,
}

// ==========================================
// ImportOrchestrator - 导入编排器
// ==========================================
pub struct ImportOrchestrator {
    lookup: Arc<dyn MetadataLookup>,
    values: Arc<dyn DataValueStore>,
    settings: Arc<SettingsManager>,
    users: Arc<dyn CurrentUserProvider>,
    completion: CompletionHandler,
    record_validator: RecordValidator,
    notifier: Arc<dyn Notifier>,
}

impl ImportOrchestrator {
    /// 创建编排器（路径层级判定 + 默认值校验 + 空通知）
    pub fn new(
        lookup: Arc<dyn MetadataLookup>,
        values: Arc<dyn DataValueStore>,
        registrations: Arc<dyn RegistrationStore>,
        settings: Arc<SettingsManager>,
        users: Arc<dyn CurrentUserProvider>,
    ) -> Self {
        Self {
            lookup,
            values,
            settings,
            users,
            completion: CompletionHandler::new(registrations),
            record_validator: RecordValidator::new(
                Arc::new(PathHierarchyOracle),
                Arc::new(DefaultValueValidator),
            ),
            notifier: Arc::new(NoOpNotifier),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// 执行一次导入
    ///
    /// # 参数
    /// - `source`: 拉取式记录流（含集合级上下文）
    /// - `options`: 调用方导入选项
    /// - `task`: 进度上报的任务 ID（None 不上报）
    ///
    /// # 返回
    /// 导入汇总；失败时 status = ERROR
    #[instrument(skip(self, source, options, task), fields(task_id = task.map(|t| t.as_str()).unwrap_or("-")))]
    pub fn import(
        &self,
        source: &mut dyn DataValueSource,
        options: &ImportOptions,
        task: Option<&TaskId>,
    ) -> ImportSummary {
        let start = Instant::now();
        self.notify(task, NotificationLevel::Info, "开始导入数据值");

        let summary = match self.prepare(source.header(), options) {
            Ok(prepared) => self.run(prepared, source, task),
            Err(e) => {
                error!(error = %e, "导入中止: 集合级上下文无效");
                ImportSummary::error(e.to_string(), Vec::new())
            }
        };

        info!(
            status = %summary.status,
            scanned = summary.scanned,
            imported = summary.import_count.imported,
            updated = summary.import_count.updated,
            deleted = summary.import_count.deleted,
            ignored = summary.import_count.ignored,
            conflicts = summary.conflicts.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "数据值导入结束"
        );

        if let Some(task) = task {
            self.notifier.complete(task, &summary);
        }
        summary
    }

    // ==========================================
    // 步骤1: 生效策略与集合级元数据
    // ==========================================
    fn prepare(&self, header: &DataValueSetHeader, options: &ImportOptions) -> ImportResult<PreparedImport> {
        let settings = self.settings.load_import_settings()?;
        let policy = EffectivePolicy::resolve(header, options, &settings);
        debug!(policy = ?policy, "导入策略已确定");

        let mut resolver = MetadataResolver::new(self.lookup.clone());

        let data_set = match trim_to_none(header.data_set.as_deref()) {
            Some(raw) => Some(
                resolver
                    .resolve_data_set(policy.id_scheme, Some(raw))?
                    .ok_or_else(|| unresolved("数据集", raw))?,
            ),
            None => None,
        };

        let org_unit = match trim_to_none(header.org_unit.as_deref()) {
            Some(raw) => Some(
                resolver
                    .resolve_organisation_unit(policy.set_org_unit_scheme(), Some(raw))?
                    .ok_or_else(|| unresolved("组织机构", raw))?,
            ),
            None => None,
        };

        let attribute_option_combo = match trim_to_none(header.attribute_option_combo.as_deref()) {
            Some(raw) => Some(
                resolver
                    .resolve_option_combo(policy.id_scheme, Some(raw))?
                    .ok_or_else(|| unresolved("属性选项组合", raw))?,
            ),
            None => None,
        };

        let period = resolver.resolve_period(header.period.as_deref());
        if period.is_none() && trim_to_none(header.period.as_deref()).is_some() {
            warn!(period = ?header.period, "集合级周期无法识别，记录须自带周期");
        }

        if policy.preheat_cache {
            resolver.preheat(policy.set_data_element_scheme(), policy.set_org_unit_scheme())?;
        }

        info!(
            data_set = data_set.as_ref().map(|d| d.uid.as_str()).unwrap_or("-"),
            strategy = %policy.strategy,
            dry_run = policy.dry_run,
            "集合级上下文校验通过"
        );

        Ok(PreparedImport {
            policy,
            resolver,
            data_set,
            period,
            org_unit,
            attribute_option_combo,
            complete_date: header.complete_date.clone(),
            username: self.users.current_username(),
            user_roots: self.users.current_org_unit_uids(),
        })
    }

    // ==========================================
    // 步骤2: 逐条处理 + 刷写 + 完成登记
    // ==========================================
    fn run(&self, prepared: PreparedImport, source: &mut dyn DataValueSource, task: Option<&TaskId>) -> ImportSummary {
        let PreparedImport {
            policy,
            mut resolver,
            data_set,
            period,
            org_unit,
            attribute_option_combo,
            complete_date,
            username,
            user_roots,
        } = prepared;

        let now = Local::now().naive_local();
        let ctx = ValidationContext {
            policy: &policy,
            outer_period: period.as_ref(),
            outer_org_unit: org_unit.as_ref(),
            outer_attribute_option_combo: attribute_option_combo.as_ref(),
            current_user: &username,
            user_roots: &user_roots,
            today: now.date(),
            now,
        };

        let mut upserter = BatchUpserter::new(
            self.values.clone(),
            policy.strategy,
            policy.dry_run,
            policy.skip_existing_check,
            policy.batch_size,
        );
        let mut acc = ImportAccumulator::new();

        loop {
            let record = match source.next_record() {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => return abort(acc, upserter.committed(), e),
            };

            let outcome = match self.record_validator.validate(&mut resolver, &ctx, &record) {
                Ok(outcome) => outcome,
                Err(e) => return abort(acc, upserter.committed(), ImportError::Repository(e)),
            };

            if let RecordOutcome::Conflict(conflict) = &outcome {
                debug!(object = %conflict.object, message = %conflict.message, "记录冲突");
            }
            acc = acc.fold(&outcome);

            if let RecordOutcome::Staged(staged) = outcome {
                if let Err(e) = upserter.stage(staged) {
                    return abort(acc, upserter.committed(), ImportError::Persistence(e.to_string()));
                }
            }

            if acc.scanned() % PROGRESS_INTERVAL == 0 {
                self.notify(task, NotificationLevel::Info, &format!("已处理 {} 条记录", acc.scanned()));
            }
        }

        if let Err(e) = upserter.flush() {
            return abort(acc, upserter.committed(), ImportError::Persistence(e.to_string()));
        }
        let counts = upserter.committed();
        debug!(
            flushes = upserter.flush_count(),
            data_element_loads = resolver.data_element_loads(),
            "数据值全部刷写完成"
        );

        // ===== 完成登记（每次导入至多一次）=====
        let mut completion_applied = None;
        if let (Some(data_set), Some(raw_date)) = (data_set.as_ref(), trim_to_none(complete_date.as_deref())) {
            let outcome = match parse_complete_date(raw_date) {
                None => Ok(CompletionOutcome::Conflict(ImportConflict::new(raw_date, "完成日期格式无效"))),
                Some(date) => self.complete(&mut resolver, data_set, &ctx, attribute_option_combo.as_ref(), date),
            };
            match outcome {
                Ok(CompletionOutcome::Created(date)) | Ok(CompletionOutcome::Updated(date)) => {
                    if !policy.dry_run {
                        completion_applied = Some(date);
                    }
                }
                Ok(CompletionOutcome::Conflict(conflict)) => {
                    warn!(object = %conflict.object, message = %conflict.message, "完成登记被跳过");
                    acc = acc.with_conflict(conflict);
                }
                Err(e) => return abort(acc, counts, ImportError::Persistence(e.to_string())),
            }
        }

        self.notify(task, NotificationLevel::Info, "数据值导入完成");
        acc.finish(counts, completion_applied)
    }

    fn complete(
        &self,
        resolver: &mut MetadataResolver,
        data_set: &DataSet,
        ctx: &ValidationContext<'_>,
        attribute_option_combo: Option<&CategoryOptionCombo>,
        complete_date: NaiveDate,
    ) -> crate::repository::error::RepositoryResult<CompletionOutcome> {
        let aoc = match attribute_option_combo {
            Some(aoc) => aoc.clone(),
            None => match resolver.default_option_combo()? {
                Some(aoc) => aoc,
                None => {
                    return Ok(CompletionOutcome::Conflict(ImportConflict::new(
                        data_set.uid.clone(),
                        "系统默认分类选项组合不存在",
                    )))
                }
            },
        };

        let request = CompletionRequest {
            data_set,
            period: ctx.outer_period,
            org_unit: ctx.outer_org_unit,
            attribute_option_combo: &aoc,
            complete_date,
            stored_by: ctx.current_user,
        };
        self.completion.complete(&request, ctx.policy.dry_run)
    }

    fn notify(&self, task: Option<&TaskId>, level: NotificationLevel, message: &str) {
        if let Some(task) = task {
            self.notifier.notify(task, level, message);
        }
    }
}

fn unresolved(kind: &str, identifier: &str) -> ImportError {
    ImportError::UnresolvedReference {
        kind: kind.to_string(),
        identifier: identifier.to_string(),
    }
}

/// 中止导入: 保留已提交计数与已收集冲突
fn abort(acc: ImportAccumulator, committed: ImportCount, err: ImportError) -> ImportSummary {
    error!(error = %err, scanned = acc.scanned(), "导入中止");
    acc.fail(err.to_string(), committed)
}

/// 完成日期: yyyy-MM-dd 或带时间的时间戳
fn parse_complete_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| parse_timestamp(Some(raw)).map(|dt| dt.date()))
}
