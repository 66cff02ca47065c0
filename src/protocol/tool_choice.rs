use crate::error::{Error, Result};
use crate::models::{ToolChoice, ToolDefinition};
use crate::protocol::workers_ai;
use std::collections::HashSet;
use tracing::debug;

/// 映射后的 (tools, tool_choice)，None 表示请求体中不出现该字段
pub type ResolvedTools = (Option<Vec<workers_ai::Tool>>, Option<workers_ai::ToolChoice>);

/// 将规范化的工具选择转换成后端表示
///
/// - 没有工具：两个字段都省略（空数组会导致后端报错）
/// - 没有 tool_choice：转发全部工具，由后端决定
/// - required：后端没有这个词，换成 any
/// - tool(name)：后端不支持指定单个工具，只保留该工具并强制 any
pub fn resolve(tools: &[ToolDefinition], tool_choice: Option<&ToolChoice>) -> Result<ResolvedTools> {
    if tools.is_empty() {
        return Ok((None, None));
    }

    ensure_unique_names(tools)?;

    let mapped: Vec<workers_ai::Tool> = tools.iter().map(workers_ai::Tool::function).collect();

    let Some(choice) = tool_choice else {
        return Ok((Some(mapped), None));
    };

    match choice {
        ToolChoice::Auto => Ok((Some(mapped), Some(workers_ai::ToolChoice::Auto))),
        ToolChoice::None => Ok((Some(mapped), Some(workers_ai::ToolChoice::None))),
        ToolChoice::Required => Ok((Some(mapped), Some(workers_ai::ToolChoice::Any))),
        ToolChoice::Tool { name } => {
            let pinned: Vec<workers_ai::Tool> =
                mapped.into_iter().filter(|tool| tool.name() == name).collect();

            if pinned.is_empty() {
                return Err(Error::UnknownTool(name.clone()));
            }

            debug!("Pinning tool choice to '{}' via tool_choice=any", name);
            Ok((Some(pinned), Some(workers_ai::ToolChoice::Any)))
        }
    }
}

fn ensure_unique_names(tools: &[ToolDefinition]) -> Result<()> {
    let mut seen = HashSet::with_capacity(tools.len());
    for tool in tools {
        if !seen.insert(tool.name.as_str()) {
            return Err(Error::DuplicateTool(tool.name.clone()));
        }
    }
    Ok(())
}
