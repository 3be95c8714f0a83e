//! 委派：父运行停下、子 Expert 并发运行、结果聚合后父运行恢复

mod common;

use std::sync::Arc;

use common::{drain, engine, names, setting, with_ask_user};
use hive::engine::delegation;
use hive::llm::{GenerateResponse, ScriptedProvider, ScriptedReply};
use hive::model::{
    CheckpointStatus, Expert, MessagePart, ProviderName, Role, RunEventKind, RunSetting, Usage,
};
use hive::EngineError;
use serde_json::json;

fn team() -> Vec<Expert> {
    vec![
        Expert::new("lead", "LEAD-EXPERT: coordinate the team.")
            .with_delegate("alpha")
            .with_delegate("beta")
            .with_delegate("gamma"),
        Expert::new("alpha", "ALPHA-EXPERT: research history."),
        Expert::new("beta", "BETA-EXPERT: research prices."),
        Expert::new("gamma", "GAMMA-EXPERT: research weather."),
    ]
}

fn reply_text(text: &str, usage: Usage) -> Vec<ScriptedReply> {
    vec![ScriptedReply::Response(GenerateResponse::text(text, usage))]
}

/// 三个子 Expert 的脚本，按指令中的标记分流
fn script_children(provider: &ScriptedProvider) {
    provider
        .on_instruction("ALPHA-EXPERT", reply_text("alpha report", Usage::new(3, 1)))
        .on_instruction("BETA-EXPERT", reply_text("beta report", Usage::new(4, 1)))
        .on_instruction("GAMMA-EXPERT", reply_text("gamma report", Usage::new(5, 1)));
}

fn fan_out() -> GenerateResponse {
    GenerateResponse::tool_calls(
        vec![
            ("d1", "alpha", json!({"query": "history of Oslo"})),
            ("d2", "beta", json!({"query": "hotel prices in Oslo"})),
            ("d3", "gamma", json!({"query": "weather in Oslo"})),
        ],
        Usage::new(10, 5),
    )
}

fn script_lead(provider: &ScriptedProvider) {
    provider.on_instruction(
        "LEAD-EXPERT",
        vec![
            ScriptedReply::Response(fan_out()),
            ScriptedReply::Response(GenerateResponse::text("Trip plan ready.", Usage::new(20, 2))),
        ],
    );
}

fn lead_setting() -> RunSetting {
    setting("lead", team(), "plan a trip to Oslo")
}

#[tokio::test]
async fn test_mixed_step_runs_plain_tools_before_stopping_for_delegate() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    provider.on_instruction(
        "LEAD-EXPERT",
        vec![ScriptedReply::Response(GenerateResponse::tool_calls(
            vec![
                ("t1", "think", json!({"thought": "split the work"})),
                ("t2", "think", json!({"thought": "ask alpha"})),
                ("d1", "alpha", json!({"query": "history of Oslo"})),
            ],
            Usage::new(10, 5),
        ))],
    );
    let (engine, mut rx) = engine(&provider);
    let setting = lead_setting();

    let stopped = engine.execute(&setting, None).await.unwrap();

    let (events, _) = drain(&mut rx);
    assert_eq!(
        names(&events, &setting.run_id),
        vec!["startRun", "callTools", "callDelegate", "stopRunByDelegate"]
    );
    assert_eq!(stopped.status, CheckpointStatus::StoppedByDelegate);
    let partial = stopped.partial_tool_results.clone().unwrap();
    let partial_ids: Vec<&str> = partial.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(partial_ids, vec!["t1", "t2"]);
    let pending = stopped.pending_tool_calls.clone().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "d1");

    let targets = stopped.delegate_to.clone().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].expert.key, "alpha");
    assert_eq!(targets[0].query, "history of Oslo");
    assert_eq!(targets[0].tool_call_id, "d1");
}

#[tokio::test]
async fn test_parallel_delegation_aggregates_children() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    provider.on_instruction("LEAD-EXPERT", vec![ScriptedReply::Response(fan_out())]);
    script_children(&provider);
    let (engine, mut rx) = engine(&provider);
    let setting = lead_setting();

    let stopped = engine.execute(&setting, None).await.unwrap();
    assert_eq!(stopped.delegate_to.as_ref().map(Vec::len), Some(3));

    let outcome = delegation::delegate(&engine, &setting, &stopped).await.unwrap();

    // 第一个目标作为恢复输入，其余直接进入 partial
    assert_eq!(outcome.result.tool_call_id, "d1");
    assert_eq!(outcome.result.text, "alpha report");
    let partial = outcome.checkpoint.partial_tool_results.clone().unwrap();
    let partial_ids: Vec<&str> = partial.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(partial_ids, vec!["d2", "d3"]);
    assert_eq!(partial[1].text(), "gamma report");
    let pending = outcome.checkpoint.pending_tool_calls.clone().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "d1");

    assert_eq!(
        outcome.checkpoint.usage,
        Usage::new(10, 5) + Usage::new(3, 1) + Usage::new(4, 1) + Usage::new(5, 1)
    );
    assert!(outcome.checkpoint.step_number >= stopped.step_number);

    let (events, _) = drain(&mut rx);
    let child_runs: Vec<&str> = events
        .iter()
        .filter(|e| e.name() == "completeRun")
        .map(|e| e.expert_key.as_str())
        .collect();
    assert_eq!(child_runs.len(), 3);
    for key in ["alpha", "beta", "gamma"] {
        assert!(child_runs.contains(&key));
    }
    let child_start = events
        .iter()
        .find(|e| e.expert_key == "beta" && e.name() == "startRun")
        .unwrap();
    let delegated_by = child_start.kind.checkpoint().delegated_by.clone().unwrap();
    assert_eq!(delegated_by.checkpoint_id, stopped.id);
    assert_eq!(delegated_by.tool_call_id, "d2");
}

#[tokio::test]
async fn test_full_run_resumes_parent_after_delegation() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    script_lead(&provider);
    script_children(&provider);
    let (engine, mut rx) = engine(&provider);
    let setting = lead_setting();

    let done = engine.run(setting.clone(), None).await.unwrap();

    assert_eq!(done.status, CheckpointStatus::Completed);
    assert_eq!(done.final_text().as_deref(), Some("Trip plan ready."));
    assert_eq!(done.step_number, 2);
    assert_eq!(done.delegate_to, None);
    assert_eq!(done.usage, Usage::new(42, 10));

    // 子结果按原始调用顺序折叠进同一条 Tool 消息
    let tool_message = done.messages.iter().find(|m| m.role == Role::Tool).unwrap();
    let folded: Vec<(&str, String)> = tool_message
        .contents
        .iter()
        .filter_map(|p| match p {
            MessagePart::ToolResult {
                tool_call_id,
                contents,
                ..
            } => Some((
                tool_call_id.as_str(),
                contents.iter().filter_map(MessagePart::as_text).collect(),
            )),
            _ => None,
        })
        .collect();
    assert_eq!(
        folded,
        vec![
            ("d1", "alpha report".to_string()),
            ("d2", "beta report".to_string()),
            ("d3", "gamma report".to_string()),
        ]
    );

    let (events, _) = drain(&mut rx);
    assert_eq!(
        names(&events, &setting.run_id),
        vec![
            "startRun",
            "callDelegate",
            "stopRunByDelegate",
            "startRun",
            "continueToNextStep",
            "completeRun",
        ]
    );
}

#[tokio::test]
async fn test_manual_resume_matches_inline_delegation() {
    let inline_provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    script_lead(&inline_provider);
    script_children(&inline_provider);
    let (inline_engine, _inline_rx) = engine(&inline_provider);
    let inline = inline_engine.run(lead_setting(), None).await.unwrap();

    let manual_provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    script_lead(&manual_provider);
    script_children(&manual_provider);
    let (manual_engine, _manual_rx) = engine(&manual_provider);
    let setting = lead_setting();
    let stopped = manual_engine.execute(&setting, None).await.unwrap();
    let outcome = delegation::delegate(&manual_engine, &setting, &stopped)
        .await
        .unwrap();
    let manual = manual_engine
        .execute(&setting.resumed_with(outcome.result), Some(outcome.checkpoint))
        .await
        .unwrap();

    assert_eq!(manual.status, inline.status);
    assert_eq!(manual.step_number, inline.step_number);
    assert_eq!(manual.usage, inline.usage);
    assert_eq!(manual.final_text(), inline.final_text());
    let roles = |c: &hive::model::Checkpoint| c.messages.iter().map(|m| m.role).collect::<Vec<_>>();
    assert_eq!(roles(&manual), roles(&inline));
    let call_counts = |c: &hive::model::Checkpoint| {
        c.messages
            .iter()
            .map(|m| m.tool_call_ids().len())
            .collect::<Vec<_>>()
    };
    assert_eq!(call_counts(&manual), call_counts(&inline));
}

#[tokio::test]
async fn test_failed_child_fails_the_parent_run() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    script_lead(&provider);
    provider
        .on_instruction("ALPHA-EXPERT", reply_text("alpha report", Usage::new(3, 1)))
        .on_instruction("GAMMA-EXPERT", reply_text("gamma report", Usage::new(5, 1)));
    // beta 没有脚本：调用会得到不可重试的错误
    provider.on_instruction("BETA-EXPERT", Vec::new());
    let (engine, mut rx) = engine(&provider);
    let setting = lead_setting();

    assert!(engine.run(setting, None).await.is_err());

    let (events, _) = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.expert_key == "beta" && e.name() == "stopRunByError"));
}

/// lead 只委派给 alpha 的两人组
fn pair(alpha: Expert) -> Vec<Expert> {
    vec![
        Expert::new("lead", "LEAD-EXPERT: coordinate the team.").with_delegate("alpha"),
        alpha,
    ]
}

fn script_lead_to_alpha(provider: &ScriptedProvider) {
    provider.on_instruction(
        "LEAD-EXPERT",
        vec![
            ScriptedReply::Response(GenerateResponse::tool_calls(
                vec![("d1", "alpha", json!({"query": "history of Oslo"}))],
                Usage::new(10, 5),
            )),
            ScriptedReply::Response(GenerateResponse::text("parent done", Usage::new(1, 1))),
        ],
    );
}

#[tokio::test]
async fn test_child_stopped_on_interactive_tool_fails_delegation() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    script_lead_to_alpha(&provider);
    provider.on_instruction(
        "ALPHA-EXPERT",
        vec![ScriptedReply::Response(GenerateResponse {
            text: "Let me ask the user first.".to_string(),
            ..GenerateResponse::tool_calls(
                vec![("a1", "askUser", json!({"question": "Which era?"}))],
                Usage::new(3, 1),
            )
        })],
    );
    let (engine, mut rx) = engine(&provider);
    let alpha = with_ask_user(Expert::new("alpha", "ALPHA-EXPERT: research history."));
    let setting = setting("lead", pair(alpha), "plan a trip to Oslo");

    let err = engine.run(setting.clone(), None).await.unwrap_err();
    assert!(
        matches!(err, EngineError::Delegation(ref m) if m.contains("stoppedByInteractiveTool")),
        "{err:?}"
    );

    let (events, _) = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.expert_key == "alpha" && e.name() == "stopRunByInteractiveTool"));
    assert!(!names(&events, &setting.run_id).contains(&"completeRun"));
}

#[tokio::test]
async fn test_child_exceeding_max_steps_fails_delegation() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    script_lead_to_alpha(&provider);
    provider.on_instruction(
        "ALPHA-EXPERT",
        vec![ScriptedReply::Response(GenerateResponse::tool_calls(
            vec![("a1", "think", json!({"thought": "where to start"}))],
            Usage::new(3, 1),
        ))],
    );
    let (engine, mut rx) = engine(&provider);
    let alpha = Expert::new("alpha", "ALPHA-EXPERT: research history.");
    let setting = setting("lead", pair(alpha), "plan a trip to Oslo").with_max_steps(1);

    let err = engine.run(setting.clone(), None).await.unwrap_err();
    assert!(
        matches!(err, EngineError::Delegation(ref m) if m.contains("stoppedByExceededMaxSteps")),
        "{err:?}"
    );

    let (events, _) = drain(&mut rx);
    assert!(events
        .iter()
        .any(|e| e.expert_key == "alpha" && e.name() == "stopRunByExceededMaxSteps"));
}

#[tokio::test]
async fn test_delegate_and_interactive_step_skips_call_tools() {
    let provider = Arc::new(ScriptedProvider::new(ProviderName::Openai));
    provider.on_instruction(
        "LEAD-EXPERT",
        vec![ScriptedReply::Response(GenerateResponse::tool_calls(
            vec![
                ("d1", "alpha", json!({"query": "history of Oslo"})),
                ("q1", "askUser", json!({"question": "Which month?"})),
            ],
            Usage::new(10, 5),
        ))],
    );
    let (engine, mut rx) = engine(&provider);
    let lead = with_ask_user(
        Expert::new("lead", "LEAD-EXPERT: coordinate the team.").with_delegate("alpha"),
    );
    let alpha = Expert::new("alpha", "ALPHA-EXPERT: research history.");
    let setting = setting("lead", vec![lead, alpha], "plan a trip to Oslo");

    let stopped = engine.execute(&setting, None).await.unwrap();

    let (events, _) = drain(&mut rx);
    assert_eq!(
        names(&events, &setting.run_id),
        vec!["startRun", "callDelegate", "stopRunByDelegate"]
    );
    match &events[1].kind {
        RunEventKind::CallDelegate { tool_calls, .. } => {
            let ids: Vec<&str> = tool_calls.iter().map(|c| c.id.as_str()).collect();
            assert_eq!(ids, vec!["d1"]);
        }
        other => panic!("unexpected event: {other:?}"),
    }
    let pending: Vec<String> = stopped
        .pending_tool_calls
        .clone()
        .unwrap()
        .into_iter()
        .map(|c| c.id)
        .collect();
    assert_eq!(pending, vec!["d1", "q1"]);
    let targets = stopped.delegate_to.clone().unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].tool_call_id, "d1");
}
