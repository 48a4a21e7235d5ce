//! 结果传递策略
//!
//! 决定上一步结果如何进入下一步参数。默认策略 CarryDataParameter：
//! 上一步结果非空，且下一单元声明了名为 "data" 的参数、调用方未显式给出时，注入上一步结果。

use serde_json::Value;

use crate::units::{Params, UnitSchema};

/// 承载上一步结果的参数名
pub const CARRIED_PARAMETER: &str = "data";

pub trait PropagationPolicy: Send + Sync {
    /// 返回下一步实际使用的参数
    fn propagate(&self, previous: Option<&Value>, next: &UnitSchema, explicit: &Params) -> Params;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CarryDataParameter;

/// null、空对象、空数组、空字符串视为空结果
pub fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

impl PropagationPolicy for CarryDataParameter {
    fn propagate(&self, previous: Option<&Value>, next: &UnitSchema, explicit: &Params) -> Params {
        let mut params = explicit.clone();
        if let Some(prev) = previous.filter(|v| !is_empty_result(v)) {
            if next.declares(CARRIED_PARAMETER) && !explicit.contains_key(CARRIED_PARAMETER) {
                params.insert(CARRIED_PARAMETER.to_string(), prev.clone());
            }
        }
        params
    }
}
