// ==========================================
// 数据值导入系统 - 分类维度服务
// ==========================================
// 职责: 默认维度初始化；分类 / 分类组合保存（显式合并）；
//       分类定义变化后追加缺失的选项组合
// 红线: 选项组合只追加不删除
// ==========================================

use crate::domain::category::{
    Category, CategoryCombo, CategoryOption, CategoryOptionCombo, DEFAULT_NAME,
};
use crate::domain::merge::Mergeable;
use crate::domain::types::MergeMode;
use crate::engine::category_combination::{generate_uid, CategoryCombinationEngine};
use crate::repository::category_repo::CategoryRepository;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub struct CategoryService {
    repo: Arc<CategoryRepository>,
    engine: CategoryCombinationEngine,
}

impl CategoryService {
    pub fn new(repo: Arc<CategoryRepository>) -> Self {
        Self {
            repo,
            engine: CategoryCombinationEngine::new(),
        }
    }

    // ==========================================
    // 默认维度
    // ==========================================

    /// 创建保留的默认 选项 / 分类 / 组合 / 选项组合（已存在时直接返回）
    #[instrument(skip(self))]
    pub fn generate_default_dimension(&self) -> RepositoryResult<CategoryCombo> {
        if let Some(existing) = self.repo.find_default_category_combo()? {
            if existing.has_option_combos() {
                return Ok(existing);
            }
            let added = self.update_option_combos(existing.id)?;
            warn!(combo_id = existing.id, added, "默认组合缺少选项组合，已补齐");
            return self.load_combo(existing.id);
        }

        let option = CategoryOption::new(&generate_uid(), DEFAULT_NAME);
        let category = Category::new(&generate_uid(), DEFAULT_NAME, vec![option]);
        self.repo.save_category(&category)?;

        let combo = CategoryCombo::new(&generate_uid(), DEFAULT_NAME, vec![category]);
        let combo_id = self.repo.save_category_combo(&combo)?;
        let added = self.update_option_combos(combo_id)?;

        info!(combo_id, added, "默认维度初始化完成");
        self.load_combo(combo_id)
    }

    /// 系统默认分类选项组合
    pub fn default_option_combo(&self) -> RepositoryResult<Option<CategoryOptionCombo>> {
        Ok(self
            .repo
            .find_default_category_combo()?
            .and_then(|combo| combo.option_combos.into_iter().next()))
    }

    // ==========================================
    // 保存
    // ==========================================

    /// 保存分类，并为包含它的所有组合追加缺失选项组合
    ///
    /// # 返回
    /// - `Ok((category_id, added))`: 新增选项组合数
    pub fn save_category(&self, incoming: &Category, mode: MergeMode) -> RepositoryResult<(i64, usize)> {
        let merged = match self.repo.find_category_by_uid(&incoming.uid)? {
            Some(mut persisted) => {
                persisted.merge_from(incoming, mode);
                persisted
            }
            None => incoming.clone(),
        };

        // 所在组合按替换后的分类重新做结构校验
        for combo_id in self.repo.list_combo_ids_containing_category(&merged.uid)? {
            let mut combo = self.load_combo(combo_id)?;
            for category in combo.categories.iter_mut().filter(|c| c.uid == merged.uid) {
                *category = merged.clone();
            }
            let violations = self.engine.validate(&combo);
            if !violations.is_empty() {
                let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
                warn!(category = %merged.uid, combo = %combo.uid, violations = ?reasons, "分类变更破坏组合结构");
                return Err(RepositoryError::ValidationError(reasons.join("; ")));
            }
        }

        let category_id = self.repo.save_category(&merged)?;
        let added = self.update_option_combos_for_category(&merged.uid)?;
        Ok((category_id, added))
    }

    /// 保存分类组合（结构校验 + 合并 + 追加选项组合）
    #[instrument(skip(self, incoming), fields(uid = %incoming.uid))]
    pub fn save_category_combo(&self, incoming: &CategoryCombo, mode: MergeMode) -> RepositoryResult<CategoryCombo> {
        let mut merged = match self.repo.find_category_combo_by_uid(&incoming.uid)? {
            Some(mut persisted) => {
                persisted.merge_from(incoming, mode);
                persisted
            }
            None => incoming.clone(),
        };

        let violations = self.engine.validate(&merged);
        if !violations.is_empty() {
            let reasons: Vec<String> = violations.iter().map(ToString::to_string).collect();
            warn!(uid = %merged.uid, violations = ?reasons, "分类组合结构非法");
            return Err(RepositoryError::ValidationError(reasons.join("; ")));
        }

        for category in &merged.categories {
            self.repo.save_category(category)?;
        }
        merged.id = self.repo.save_category_combo(&merged)?;
        self.update_option_combos(merged.id)?;
        self.load_combo(merged.id)
    }

    // ==========================================
    // 选项组合对账
    // ==========================================

    /// 对一个分类组合追加缺失的选项组合
    ///
    /// # 返回
    /// - `Ok(added)`: 新增数量（未变化时为 0）
    pub fn update_option_combos(&self, category_combo_id: i64) -> RepositoryResult<usize> {
        let combo = self.load_combo(category_combo_id)?;
        let generated = self.engine.generate_combinations(&combo.categories);
        let missing = self.engine.reconcile(&combo, generated);
        if missing.is_empty() {
            return Ok(0);
        }

        self.repo.insert_option_combos(combo.id, &missing)?;
        for option_combo in &missing {
            info!(
                option_combo = %option_combo.name,
                category_combo = %combo.name,
                "追加缺失的分类选项组合"
            );
        }
        Ok(missing.len())
    }

    /// 所有包含该分类的组合
    pub fn update_option_combos_for_category(&self, category_uid: &str) -> RepositoryResult<usize> {
        let mut added = 0;
        for combo_id in self.repo.list_combo_ids_containing_category(category_uid)? {
            added += self.update_option_combos(combo_id)?;
        }
        Ok(added)
    }

    pub fn update_all_option_combos(&self) -> RepositoryResult<usize> {
        let mut added = 0;
        for combo_id in self.repo.list_category_combo_ids()? {
            added += self.update_option_combos(combo_id)?;
        }
        info!(added, "全部分类组合对账完成");
        Ok(added)
    }

    /// 按展示顺序返回已持久化的选项组合
    pub fn sorted_option_combos(&self, category_combo_uid: &str) -> RepositoryResult<Vec<CategoryOptionCombo>> {
        let combo = self
            .repo
            .find_category_combo_by_uid(category_combo_uid)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "CategoryCombo".to_string(),
                id: category_combo_uid.to_string(),
            })?;
        Ok(self.engine.sorted_option_combos(&combo))
    }

    fn load_combo(&self, id: i64) -> RepositoryResult<CategoryCombo> {
        self.repo
            .find_category_combo(id)?
            .ok_or_else(|| RepositoryError::NotFound {
                entity: "CategoryCombo".to_string(),
                id: id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;
    use std::sync::Mutex;

    fn setup() -> CategoryService {
        let conn = open_in_memory().expect("创建测试数据库失败");
        CategoryService::new(Arc::new(CategoryRepository::new(Arc::new(Mutex::new(conn)))))
    }

    fn create_test_combo() -> CategoryCombo {
        CategoryCombo::new(
            "CC_SEX_AGE",
            "Sex and age",
            vec![
                Category::new(
                    "SEX",
                    "Sex",
                    vec![CategoryOption::new("M", "Male"), CategoryOption::new("F", "Female")],
                ),
                Category::new(
                    "AGE",
                    "Age",
                    vec![CategoryOption::new("U5", "<5"), CategoryOption::new("O5", "5+")],
                ),
            ],
        )
    }

    #[test]
    fn test_default_dimension_is_idempotent() {
        let service = setup();
        let first = service.generate_default_dimension().unwrap();
        assert!(first.is_default());
        assert_eq!(first.option_combos.len(), 1);

        let second = service.generate_default_dimension().unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(service.default_option_combo().unwrap().unwrap().uid, first.option_combos[0].uid);
    }

    #[test]
    fn test_save_combo_generates_and_regeneration_is_noop() {
        let service = setup();
        let combo = service.save_category_combo(&create_test_combo(), MergeMode::Replace).unwrap();
        assert_eq!(combo.option_combos.len(), 4);

        assert_eq!(service.update_option_combos(combo.id).unwrap(), 0);
        assert_eq!(service.update_all_option_combos().unwrap(), 0);

        let sorted: Vec<String> = service
            .sorted_option_combos("CC_SEX_AGE")
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(sorted, vec!["Male, <5", "Male, 5+", "Female, <5", "Female, 5+"]);
    }

    #[test]
    fn test_new_option_appends_missing_combos() {
        let service = setup();
        let combo = service.save_category_combo(&create_test_combo(), MergeMode::Replace).unwrap();
        let before: Vec<String> = combo.option_combos.iter().map(|c| c.uid.clone()).collect();

        let mut sex = combo.categories[0].clone();
        sex.options.push(CategoryOption::new("X", "Other"));
        let (_, added) = service.save_category(&sex, MergeMode::Replace).unwrap();
        assert_eq!(added, 2);

        let after = service.sorted_option_combos("CC_SEX_AGE").unwrap();
        assert_eq!(after.len(), 6);
        assert!(before.iter().all(|uid| after.iter().any(|c| &c.uid == uid)));
    }

    #[test]
    fn test_invalid_combo_is_rejected() {
        let service = setup();
        let mut combo = create_test_combo();
        combo.categories[1].options.push(CategoryOption::new("M", "Male"));
        let err = service.save_category_combo(&combo, MergeMode::Replace).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));
    }

    #[test]
    fn test_category_sharing_option_with_sibling_is_rejected() {
        let service = setup();
        let combo = service.save_category_combo(&create_test_combo(), MergeMode::Replace).unwrap();

        let mut sex = combo.categories[0].clone();
        sex.options.push(CategoryOption::new("U5", "<5"));
        let err = service.save_category(&sex, MergeMode::Replace).unwrap_err();
        assert!(matches!(err, RepositoryError::ValidationError(_)));

        // 分类与组合均保持原状
        let after = service.sorted_option_combos("CC_SEX_AGE").unwrap();
        assert_eq!(after.len(), 4);
        let reloaded = service.load_combo(combo.id).unwrap();
        assert_eq!(reloaded.categories[0].options.len(), 2);
    }

    #[test]
    fn test_merge_mode_keeps_categories() {
        let service = setup();
        service.save_category_combo(&create_test_combo(), MergeMode::Replace).unwrap();

        let rename = CategoryCombo::new("CC_SEX_AGE", "Sex / age", Vec::new());
        let merged = service.save_category_combo(&rename, MergeMode::Merge).unwrap();
        assert_eq!(merged.name, "Sex / age");
        assert_eq!(merged.categories.len(), 2);
        assert_eq!(merged.option_combos.len(), 4);
    }
}
