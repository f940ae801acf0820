//! Initialize a new Reshape project

use anyhow::Result;
use std::fs;
use std::path::Path;

/// Run the init command
pub async fn run(path: &str, name: Option<&str>) -> Result<()> {
    let project_dir = Path::new(path);

    // Create directory if it doesn't exist
    if !project_dir.exists() {
        fs::create_dir_all(project_dir)?;
    }

    // Get absolute path for deriving name
    let abs_path = project_dir.canonicalize()?;

    // Derive project name from directory name if not provided
    let project_name = match name {
        Some(n) => n.to_string(),
        None => abs_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("Could not determine project name from path"))?,
    };

    // Check if already initialized
    if project_dir.join("reshape.yaml").exists() {
        anyhow::bail!(
            "Directory '{}' already contains a reshape.yaml",
            project_dir.display()
        );
    }

    tracing::info!("Creating new Reshape project: {}", project_name);

    // Create directory structure
    fs::create_dir_all(project_dir.join("templates"))?;
    fs::create_dir_all(project_dir.join("profiles"))?;
    fs::create_dir_all(project_dir.join("data"))?;

    // Create reshape.yaml
    let config = format!(
        r#"# Reshape Project Configuration
name: {project_name}
version: "0.1.0"

settings:
  scan_period_seconds: 20
  request_timeout_seconds: 60
  max_upload_bytes: 52428800
  per_format_upload_bytes:
    excel: 104857600
  csv_delimiter: ","
  xml_record_element: record
  output_dir: output
  on_row_error: stop_on_error

# Remote sources converted whenever their content changes
watch: []
#  - url: https://example.com/exports/people.csv
#    intervalMinutes: 60
#    mappingTemplateId: people
"#
    );
    fs::write(project_dir.join("reshape.yaml"), config)?;

    // Create example templates
    let source_template = r#"# Layout of the incoming CSV
name: people-csv
format: csv
fields:
  - name: Name
    kind: String
  - name: Age
    kind: String
  - name: Joined
    kind: String
"#;
    fs::write(project_dir.join("templates/people-csv.yaml"), source_template)?;

    let target_template = r#"# Layout of the converted records
name: people-json
format: json
fields:
  - name: FullName
    kind: String
  - name: Years
    kind: Integer
  - name: JoinedOn
    kind: DateTime
"#;
    fs::write(project_dir.join("templates/people-json.yaml"), target_template)?;

    // Create example profile
    let profile = r#"# Mapping from people-csv to people-json
name: people
source_template: people-csv
target_template: people-json
rules:
  - source: Name
    target: FullName
    kind: String
  - source: Age
    target: Years
    kind: Integer
  - source: Joined
    target: JoinedOn
    kind: DateTime
    date_format: dd/MM/yyyy
"#;
    fs::write(project_dir.join("profiles/people.yaml"), profile)?;

    // Create .gitignore
    let gitignore = r#"# Converted output
output/

# IDE
.idea/
.vscode/
*.swp
"#;
    fs::write(project_dir.join(".gitignore"), gitignore)?;

    // Create sample input data
    let sample_data = "Name,Age,Joined\nAlice,30,05/01/2024\nBob,25,17/03/2023\nCarol,41,\n";
    fs::write(project_dir.join("data/people.csv"), sample_data)?;

    tracing::info!(
        "✓ Created project '{}' at {}",
        project_name,
        abs_path.display()
    );
    tracing::info!("");
    tracing::info!("Next steps:");
    if path != "." {
        tracing::info!("  cd {}", project_dir.display());
    }
    tracing::info!("  reshape validate                                 # Check configuration");
    tracing::info!("  reshape convert data/people.csv --profile people # Convert the sample");

    Ok(())
}
