//! crates/manuscript_core/src/prompts.rs
//!
//! Every fixed prompt sent to the generation service lives here, so the wording of a
//! rule changes in exactly one place and tests can inspect the built messages without
//! calling a model. The long conversion rule sets are not in this file: they are read
//! from the template store at call time.

use crate::domain::WorkflowKind;

/// Output budget for conversion and revision calls.
pub const CONVERSION_MAX_TOKENS: u32 = 8000;

/// Output budget for proofreading calls.
pub const PROOFREAD_MAX_TOKENS: u32 = 4000;

/// Strict marker the proofreader is told to put around each finding.
pub const FINDING_MARKER: &str = "校閲：";

/// Looser marker counted when the strict one never appears.
pub const LOOSE_FINDING_MARKER: &str = "指摘";

const REPORTER_NOT_SPECIFIED: &str = "（指定なし）";

const PROOFREAD_CHECKLIST: &str = r#"あなたは日本語の校閲専門家です。
記事の校閲チェックを行い、以下の項目を確認してください：

1. 誤字・脱字
2. 漢字の誤用（同音異義語の誤り）
3. 送り仮名の揺れ
4. 全角英数字（半角に統一すべき箇所）
5. タグの閉じ忘れ（##タグ## と #### の対応）
6. 見出しの問題（同じパターンの連続、段落冒頭のコピー）"#;

const QA_CHECKLIST_EXTRA: &str = "7. 質問者・回答者の表記揺れ（Q／A の対応）";

const PROOFREAD_RULES: &str = r#"【重要】
- 原文は一切修正せず、指摘のみを行う
- 指摘は該当箇所の直後に「（校閲：●●）」の形式で記載
- 問題がない場合は「校閲チェック完了：問題なし」と報告"#;

const REVISION_RULES: &str = r#"【修正のルール】
- 修正依頼で指示された箇所だけを変更し、それ以外は一字一句変えない
- 談話や引用（「」内の発言）の内容は絶対に変更しない
- 修正後の全文のみを出力し、説明は不要"#;

fn document_noun(kind: WorkflowKind) -> &'static str {
    match kind {
        WorkflowKind::Markdown => "マークダウン記事",
        WorkflowKind::Qa => "一問一答形式の記事",
    }
}

/// Builds the single convert message: rule template, task header, then the manuscript.
///
/// The reporter section is only part of the markdown workflow.
pub fn conversion_prompt(
    template: &str,
    kind: WorkflowKind,
    manuscript: &str,
    reporter_name: Option<&str>,
) -> String {
    match kind {
        WorkflowKind::Markdown => {
            let reporter = reporter_name
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .unwrap_or(REPORTER_NOT_SPECIFIED);
            format!(
                "{template}\n\n---\n\n以下のWord原稿をマークダウン形式に変換してください。\n\n\
                 【記者名】\n{reporter}\n（記者名が指定されている場合は、記事の末尾に記者名タグを付けてください）\n\n\
                 【原稿】\n{manuscript}\n\n---\n\n\
                 上記の原稿を、指示されたルールに従ってマークダウン形式に変換してください。\n\
                 変換後のマークダウンのみを出力し、説明は不要です。"
            )
        }
        WorkflowKind::Qa => format!(
            "{template}\n\n---\n\n以下の原稿を一問一答形式に変換してください。\n\n\
             【原稿】\n{manuscript}\n\n---\n\n\
             上記の原稿を、指示されたルールに従って一問一答形式に変換してください。\n\
             変換後の本文のみを出力し、説明は不要です。"
        ),
    }
}

/// Builds the proofreading message for already-converted text.
pub fn proofread_prompt(kind: WorkflowKind, converted: &str) -> String {
    let checklist = match kind {
        WorkflowKind::Markdown => PROOFREAD_CHECKLIST.to_string(),
        WorkflowKind::Qa => format!("{}\n{}", PROOFREAD_CHECKLIST, QA_CHECKLIST_EXTRA),
    };
    format!(
        "{checklist}\n\n{PROOFREAD_RULES}\n\n---\n\n以下の{noun}を校閲チェックしてください。\n\n\
         {converted}\n\n---\n\n\
         校閲レポートを作成してください。\n指摘がある場合は、該当箇所と指摘内容を明記してください。",
        noun = document_noun(kind)
    )
}

/// Builds the revision message: current text plus the user's change request.
pub fn revision_prompt(kind: WorkflowKind, current: &str, request: &str) -> String {
    format!(
        "あなたは新聞社の編集者です。以下の{noun}に対する修正依頼を反映してください。\n\n\
         {REVISION_RULES}\n\n【修正依頼】\n{request}\n\n【現在の{noun}】\n{current}",
        noun = document_noun(kind)
    )
}
