//! Code development tools: read recipe code, check its syntax, and dry-run
//! a recipe against its inputs and outputs.
//!
//! Python is checked with a real parser. SQL and R only get delimiter and
//! quote counting. Nothing is executed.

use regex::Regex;
use rustpython_parser::Mode;
use serde_json::{json, Value};

use super::exploration::parse_tsv;
use super::fields::{self, line_count};
use super::{tool, Args, ToolResult};
use crate::dss::{recipe_refs, Dss};
use crate::mcp::server::ToolDefinition;

pub fn definitions() -> Vec<ToolDefinition> {
    let key_and_recipe = json!({
        "type": "object",
        "properties": {
            "project_key": { "type": "string", "description": "The project key" },
            "recipe_name": { "type": "string", "description": "Name of the recipe" }
        },
        "required": ["project_key", "recipe_name"]
    });

    vec![
        tool(
            "get_recipe_code",
            "Extract the code of a recipe. Code recipes return their source; SQL query recipes \
             their SQL; visual recipes their parameters as JSON.",
            key_and_recipe,
        ),
        tool(
            "validate_recipe_syntax",
            "Check recipe code for syntax problems before running it (Python, SQL, R, or JSON \
             for other types).",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_name": { "type": "string", "description": "Name of the recipe" },
                    "code": { "type": "string", "description": "Code to validate instead of the stored recipe code" }
                },
                "required": ["project_key", "recipe_name"]
            }),
        ),
        tool(
            "test_recipe_dry_run",
            "Check that a recipe's inputs are readable, its outputs exist, and its code looks \
             complete, without running it.",
            json!({
                "type": "object",
                "properties": {
                    "project_key": { "type": "string", "description": "The project key" },
                    "recipe_name": { "type": "string", "description": "Name of the recipe" },
                    "sample_rows": { "type": "integer", "minimum": 0, "description": "Rows to read from each input (default 100)" }
                },
                "required": ["project_key", "recipe_name"]
            }),
        ),
    ]
}

// ==================== Code extraction ====================

/// Language of the source stored in a recipe payload, by recipe type.
fn code_language(recipe_type: &str) -> Option<&'static str> {
    match recipe_type {
        "python" | "pyspark" => Some("python"),
        "r" | "sparkr" => Some("r"),
        "scala" | "spark_scala" => Some("scala"),
        "sql" | "sql_query" | "sql_script" | "sparksql" | "hive" | "impala" => Some("sql"),
        "shell" => Some("shell"),
        _ => None,
    }
}

fn code_info(language: &str, source: &str, code: &str) -> Value {
    json!({
        "language": language,
        "source": source,
        "line_count": line_count(code),
        "char_count": code.chars().count(),
    })
}

/// Finds the recipe code: the payload for code recipes, an embedded query
/// for JSON payloads, and the recipe parameters otherwise.
fn extract_code(recipe: &Value, payload: &Value) -> (String, Value) {
    let recipe_type = fields::text(recipe, "type");
    let text = payload.as_str().unwrap_or("");

    if !text.trim().is_empty() {
        if let Some(language) = code_language(recipe_type) {
            return (text.to_string(), code_info(language, "payload", text));
        }
        if let Ok(Value::Object(doc)) = serde_json::from_str::<Value>(text) {
            let embedded = ["sql", "query", "code"]
                .iter()
                .find_map(|k| doc.get(*k).and_then(Value::as_str).filter(|s| !s.is_empty()));
            if let Some(code) = embedded {
                return (code.to_string(), code_info("sql", "payload", code));
            }
        }
    }

    let params = fields::object(recipe, "params");
    let code = serde_json::to_string_pretty(&params).unwrap_or_else(|_| params.to_string());
    let mut info = code_info("json", "recipe_params", &code);
    info["type"] = json!("recipe_config");
    (code, info)
}

pub async fn get_recipe_code(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;

    let settings = dss.project(project_key).recipe(recipe_name).await?;
    let recipe = &settings["recipe"];
    let (code, code_info) = extract_code(recipe, &settings["payload"]);

    Ok(json!({
        "recipe_info": {
            "name": recipe_name,
            "type": fields::text_or(recipe, "type", "unknown"),
            "engine": fields::text_at(recipe, "/params/engineType", "unknown"),
            "inputs": recipe_refs(recipe, "inputs"),
            "outputs": recipe_refs(recipe, "outputs"),
        },
        "code": code,
        "code_info": code_info,
    }))
}

// ==================== Syntax checks ====================

#[derive(Debug, Clone, PartialEq, Eq)]
struct SyntaxIssue {
    line: usize,
    column: usize,
    message: String,
}

/// First syntax error reported by the Python parser, with a 1-based line
/// and column.
fn python_syntax_error(code: &str) -> Option<SyntaxIssue> {
    let error = rustpython_parser::parse(code, Mode::Module, "<recipe>").err()?;
    let offset = usize::from(error.offset).min(code.len());
    let before = code.get(..offset).unwrap_or(code);
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    Some(SyntaxIssue {
        line: before.matches('\n').count() + 1,
        column: before[line_start..].chars().count() + 1,
        message: error.error.to_string(),
    })
}

fn problem(kind: &str, message: &str) -> Value {
    json!({"type": kind, "message": message})
}

fn count(code: &str, pattern: &str) -> usize {
    code.matches(pattern).count()
}

fn python_checks(code: &str, errors: &mut Vec<Value>, warnings: &mut Vec<Value>) -> bool {
    let valid = match python_syntax_error(code) {
        Some(issue) => {
            let text = code.lines().nth(issue.line - 1).unwrap_or_default().trim();
            errors.push(json!({
                "type": "syntax_error",
                "line": issue.line,
                "column": issue.column,
                "message": issue.message,
                "text": text,
            }));
            false
        }
        None => true,
    };

    let usage = CodeUsage::of(code);
    if !code.to_lowercase().contains("dataiku") {
        warnings.push(problem(
            "missing_dataiku_import",
            "Code doesn't seem to import dataiku package",
        ));
    }
    if !usage.reads_input {
        warnings.push(problem(
            "no_input_handling",
            "Code doesn't seem to handle input datasets",
        ));
    }
    if !usage.writes_output {
        warnings.push(problem(
            "no_output_handling",
            "Code doesn't seem to write to output datasets",
        ));
    }
    valid
}

fn sql_checks(code: &str) -> Vec<Value> {
    let mut errors = Vec::new();
    let has_select = Regex::new(r"(?i)\bSELECT\b").map_or(false, |re| re.is_match(code));
    if !has_select {
        errors.push(problem(
            "missing_select",
            "SQL code should contain a SELECT statement",
        ));
    }
    if count(code, "(") != count(code, ")") {
        errors.push(problem(
            "unbalanced_parentheses",
            "Unbalanced parentheses in SQL code",
        ));
    }
    if (count(code, "'") - count(code, "\\'")) % 2 != 0 {
        errors.push(problem("unterminated_string", "Unterminated single-quoted string"));
    }
    if (count(code, "\"") - count(code, "\\\"")) % 2 != 0 {
        errors.push(problem("unterminated_string", "Unterminated double-quoted string"));
    }
    errors
}

fn r_checks(code: &str) -> Vec<Value> {
    [
        ('(', ')', "unbalanced_parentheses", "Unbalanced parentheses in R code"),
        ('[', ']', "unbalanced_brackets", "Unbalanced brackets in R code"),
        ('{', '}', "unbalanced_braces", "Unbalanced braces in R code"),
    ]
    .iter()
    .filter(|(open, close, ..)| code.matches(*open).count() != code.matches(*close).count())
    .map(|(.., kind, message)| problem(kind, message))
    .collect()
}

pub async fn validate_recipe_syntax(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;
    let supplied = args.opt_str("code")?;

    let settings = dss.project(project_key).recipe(recipe_name).await?;
    let recipe = &settings["recipe"];
    let code = supplied.unwrap_or_else(|| settings["payload"].as_str().unwrap_or(""));

    if code.trim().is_empty() {
        return Ok(json!({
            "valid": true,
            "message": "No code to validate (empty recipe)",
            "errors": [],
        }));
    }

    let recipe_type = fields::text_or(recipe, "type", "unknown");
    let mut results = json!({
        "recipe_name": recipe_name,
        "recipe_type": recipe_type,
        "code_length": code.chars().count(),
        "line_count": line_count(code),
    });
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    match recipe_type {
        "python" | "pyspark" => {
            results["python_ast_valid"] = json!(python_checks(code, &mut errors, &mut warnings));
        }
        "sql" => {
            errors = sql_checks(code);
            results["sql_basic_valid"] = json!(errors.is_empty());
        }
        "r" => {
            errors = r_checks(code);
            results["r_basic_valid"] = json!(errors.is_empty());
        }
        _ => {
            results["json_valid"] = json!(serde_json::from_str::<Value>(code).is_ok());
        }
    }

    Ok(json!({
        "valid": errors.is_empty(),
        "validation_results": results,
        "error_count": errors.len(),
        "warning_count": warnings.len(),
        "errors": errors,
        "warnings": warnings,
    }))
}

// ==================== Dry run ====================

/// Dataiku API usage spotted in Python recipe code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CodeUsage {
    imports_dataiku: bool,
    reads_input: bool,
    writes_output: bool,
}

const DATAIKU_IMPORT: &str = r"(?m)^\s*(import\s+dataiku\b|from\s+dataiku(\.\w+)*\s+import\b)";

impl CodeUsage {
    fn of(code: &str) -> Self {
        let imports_dataiku = Regex::new(DATAIKU_IMPORT).map_or(false, |re| re.is_match(code));
        Self {
            imports_dataiku,
            reads_input: code.contains("get_dataframe") || code.contains("iter_rows"),
            writes_output: code.contains("write_with_schema") || code.contains("write_dataframe"),
        }
    }
}

/// Splits a `PROJECT.name` reference; bare names belong to `project_key`.
fn split_ref<'a>(reference: &'a str, project_key: &'a str) -> (&'a str, &'a str) {
    reference
        .split_once('.')
        .unwrap_or((project_key, reference))
}

async fn check_input(dss: &Dss, project_key: &str, reference: &str, sample_rows: u64) -> Value {
    let (owner, name) = split_ref(reference, project_key);
    let project = dss.project(owner);
    let schema = match project.dataset_schema(name).await {
        Ok(schema) => schema,
        Err(e) => {
            return json!({
                "name": reference,
                "status": "error",
                "message": format!("Input dataset not accessible: {e}"),
            })
        }
    };
    let columns: Vec<&str> = fields::list(&schema, "columns")
        .iter()
        .map(|c| fields::text(c, "name"))
        .collect();

    let sample = project
        .dataset_rows_tsv(name, &[], sample_rows)
        .await
        .map_err(|e| e.to_string())
        .and_then(|tsv| parse_tsv(&tsv).map_err(|e| e.to_string()));
    match sample {
        Ok(rows) => json!({
            "name": reference,
            "status": "ok",
            "schema_columns": columns.len(),
            "sample_rows": rows.len(),
            "sample_columns": columns,
        }),
        Err(e) => json!({
            "name": reference,
            "status": "warning",
            "message": format!("Could not read sample data: {e}"),
            "schema_columns": columns.len(),
        }),
    }
}

async fn check_output(dss: &Dss, project_key: &str, reference: &str) -> Value {
    let (owner, name) = split_ref(reference, project_key);
    match dss.project(owner).dataset(name).await {
        Ok(dataset) => json!({
            "name": reference,
            "status": "ok",
            "exists": true,
            "type": fields::field(&dataset, "type"),
        }),
        Err(e) => json!({
            "name": reference,
            "status": "warning",
            "exists": false,
            "message": format!("Output dataset will be created: {e}"),
        }),
    }
}

fn code_analysis(code: &str) -> Value {
    let usage = CodeUsage::of(code);
    let mut analysis = json!({
        "has_dataiku_import": usage.imports_dataiku,
        "has_input_read": usage.reads_input,
        "has_output_write": usage.writes_output,
        "line_count": line_count(code),
        "ast_valid": true,
    });
    if let Some(issue) = python_syntax_error(code) {
        analysis["ast_valid"] = json!(false);
        analysis["error"] = json!(format!("{} (line {})", issue.message, issue.line));
    }
    analysis
}

fn recommendations(input_errors: usize, analysis: Option<&Value>) -> Vec<&'static str> {
    let mut out = Vec::new();
    if input_errors > 0 {
        out.push("Fix input dataset access issues before running");
    }
    if let Some(analysis) = analysis {
        if !fields::flag(analysis, "has_dataiku_import", false) {
            out.push("Add 'import dataiku' to your code");
        }
        if !fields::flag(analysis, "has_input_read", false) {
            out.push("Add code to read input datasets");
        }
        if !fields::flag(analysis, "has_output_write", false) {
            out.push("Add code to write output datasets");
        }
    }
    out
}

fn count_status(checks: &[Value], status: &str) -> usize {
    checks
        .iter()
        .filter(|c| fields::text(c, "status") == status)
        .count()
}

pub async fn test_recipe_dry_run(dss: &Dss, args: &Args<'_>) -> ToolResult {
    let project_key = args.str("project_key")?;
    let recipe_name = args.str("recipe_name")?;
    let sample_rows = args.u64_or("sample_rows", 100)?;

    let settings = dss.project(project_key).recipe(recipe_name).await?;
    let recipe = &settings["recipe"];
    let recipe_type = fields::text_or(recipe, "type", "unknown");
    let inputs = recipe_refs(recipe, "inputs");
    let outputs = recipe_refs(recipe, "outputs");

    let mut input_checks = Vec::with_capacity(inputs.len());
    for input in &inputs {
        input_checks.push(check_input(dss, project_key, input, sample_rows).await);
    }
    let mut output_checks = Vec::with_capacity(outputs.len());
    for output in &outputs {
        output_checks.push(check_output(dss, project_key, output).await);
    }

    let mut test_results = json!({
        "recipe_name": recipe_name,
        "recipe_type": recipe_type,
        "inputs": inputs,
        "outputs": outputs,
        "sample_rows": sample_rows,
    });

    let analysis = matches!(recipe_type, "python" | "pyspark")
        .then(|| code_analysis(settings["payload"].as_str().unwrap_or("")));

    let input_errors = count_status(&input_checks, "error");
    let output_errors = count_status(&output_checks, "error");
    test_results["input_checks"] = json!(input_checks);
    test_results["output_checks"] = json!(output_checks);
    test_results["test_summary"] = json!({
        "overall_status": if input_errors == 0 && output_errors == 0 { "ok" } else { "warning" },
        "input_errors": input_errors,
        "output_errors": output_errors,
        "ready_for_execution": input_errors == 0,
        "recommendations": recommendations(input_errors, analysis.as_ref()),
    });
    if let Some(analysis) = analysis {
        test_results["code_analysis"] = analysis;
    }

    Ok(json!({ "test_results": test_results }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_recipes_return_their_payload() {
        let (code, info) = extract_code(&json!({"type": "pyspark"}), &json!("import dataiku\n"));
        assert_eq!(code, "import dataiku\n");
        assert_eq!(info["language"], "python");
        assert_eq!(info["line_count"], 2);
    }

    #[test]
    fn json_payloads_expose_embedded_sql() {
        let payload = json!(r#"{"sql": "SELECT 1"}"#);
        let (code, info) = extract_code(&json!({"type": "custom"}), &payload);
        assert_eq!(code, "SELECT 1");
        assert_eq!(info["language"], "sql");
    }

    #[test]
    fn visual_recipes_fall_back_to_params() {
        let recipe = json!({"type": "join", "params": {"joins": []}});
        let (code, info) = extract_code(&recipe, &Value::Null);
        assert!(code.contains("\"joins\""));
        assert_eq!(info["source"], "recipe_params");
        assert_eq!(info["type"], "recipe_config");
    }

    #[test]
    fn python_parser_accepts_valid_code() {
        let code = "import dataiku\n# (unbalanced in a comment\ndf = f(\"a)\", '''x\n(''')\n";
        assert_eq!(python_syntax_error(code), None);
        assert_eq!(
            python_syntax_error("def f(x):\n    return {x: [1, 2]}\n"),
            None
        );
    }

    #[test]
    fn python_parser_catches_what_brackets_miss() {
        for code in ["x = = 1", "if True\n    print(1)", "def f(:"] {
            assert!(python_syntax_error(code).is_some(), "{code:?} parsed");
        }

        let issue = python_syntax_error("import dataiku\n  x = 1\n").unwrap();
        assert_eq!(issue.line, 2);
        assert!(!issue.message.is_empty());

        let issue = python_syntax_error("x = 1\ny = f(1, [2)\n").unwrap();
        assert_eq!(issue.line, 2);
        assert!(issue.column > 1);
    }

    #[test]
    fn python_checks_report_parser_errors() {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        assert!(!python_checks("import dataiku\nx = = 1\n", &mut errors, &mut warnings));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["type"], "syntax_error");
        assert_eq!(errors[0]["line"], 2);
        assert_eq!(errors[0]["text"], "x = = 1");
    }

    #[test]
    fn python_checks_warn_about_dataiku_usage() {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();
        assert!(python_checks("print(1)", &mut errors, &mut warnings));
        assert!(errors.is_empty());
        assert_eq!(warnings.len(), 3);
    }

    #[test]
    fn sql_checks_find_basic_problems() {
        assert!(sql_checks("SELECT a FROM t WHERE b = 'x'").is_empty());
        let errors = sql_checks("UPDATE t SET a = (1");
        let kinds: Vec<&str> = errors.iter().map(|e| e["type"].as_str().unwrap()).collect();
        assert_eq!(kinds, vec!["missing_select", "unbalanced_parentheses"]);
    }

    #[test]
    fn r_checks_count_each_delimiter() {
        assert!(r_checks("f <- function(x) { x[1] }").is_empty());
        let errors = r_checks("f <- function(x) { x[1 }");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["type"], "unbalanced_brackets");
    }

    #[test]
    fn code_usage_detects_imports() {
        let usage = CodeUsage::of("from dataiku import pandasutils\ndf = ds.get_dataframe()\n");
        assert!(usage.imports_dataiku);
        assert!(usage.reads_input);
        assert!(!usage.writes_output);
        assert!(!CodeUsage::of("# import dataiku").imports_dataiku);
    }

    #[test]
    fn recommendations_follow_analysis() {
        let analysis = json!({
            "has_dataiku_import": true,
            "has_input_read": false,
            "has_output_write": true,
        });
        assert_eq!(
            recommendations(1, Some(&analysis)),
            vec![
                "Fix input dataset access issues before running",
                "Add code to read input datasets",
            ]
        );
        assert!(recommendations(0, None).is_empty());
    }

    #[test]
    fn references_split_on_project() {
        assert_eq!(split_ref("OTHER.orders", "PROJ"), ("OTHER", "orders"));
        assert_eq!(split_ref("orders", "PROJ"), ("PROJ", "orders"));
    }
}
