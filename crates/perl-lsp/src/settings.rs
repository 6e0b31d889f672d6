//! Server settings, received through `workspace/configuration` under the
//! `perl` section.

use perl_analyzer::{CachingStrategy, FunctionCallStyle, ImportStyle};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerlSettings {
    /// Enables the full-file diagnostic walk.
    pub show_all_errors: bool,
    /// Workspace-wide diagnostic cap; past it, analysis stops collecting.
    pub max_number_of_problems: usize,
    pub caching: CachingSetting,
    pub import_style: ImportStyleSetting,
    pub function_call_style: FunctionCallStyleSetting,
}

impl Default for PerlSettings {
    fn default() -> Self {
        PerlSettings {
            show_all_errors: true,
            max_number_of_problems: 100,
            caching: CachingSetting::Eager,
            import_style: ImportStyleSetting::Full,
            function_call_style: FunctionCallStyleSetting::PackageAndFunction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum CachingSetting {
    #[serde(rename = "full")]
    Full,
    #[serde(rename = "eager")]
    Eager,
}

impl From<CachingSetting> for CachingStrategy {
    fn from(s: CachingSetting) -> Self {
        match s {
            CachingSetting::Full => CachingStrategy::Full,
            CachingSetting::Eager => CachingStrategy::Eager,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ImportStyleSetting {
    #[serde(rename = "Full")]
    Full,
    #[serde(rename = "Function Only")]
    FunctionOnly,
}

impl From<ImportStyleSetting> for ImportStyle {
    fn from(s: ImportStyleSetting) -> Self {
        match s {
            ImportStyleSetting::Full => ImportStyle::Full,
            ImportStyleSetting::FunctionOnly => ImportStyle::FunctionOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum FunctionCallStyleSetting {
    #[serde(rename = "packageName+functionName")]
    PackageAndFunction,
    #[serde(rename = "functionName only")]
    FunctionNameOnly,
}

impl From<FunctionCallStyleSetting> for FunctionCallStyle {
    fn from(s: FunctionCallStyleSetting) -> Self {
        match s {
            FunctionCallStyleSetting::PackageAndFunction => FunctionCallStyle::PackageAndFunction,
            FunctionCallStyleSetting::FunctionNameOnly => FunctionCallStyle::FunctionNameOnly,
        }
    }
}
