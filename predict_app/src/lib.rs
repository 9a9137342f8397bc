//! Terminal front end that predicts cloud classes with a published model.
//!
//! The user picks one of the configured model versions, which is fetched from
//! the object store, then enters one value per model feature and gets a class
//! label back. Entering `q` at any prompt quits.

use std::io::{self, BufRead, Write};
use std::path::Path;

use serde::Deserialize;
use tracing::{error, info};

use clouds_pipeline::config::AwsConfig;
use clouds_pipeline::models::RandomForest;
use clouds_pipeline::store::{ObjectStore, fetch_model};

/// The part of the configuration file the app reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub aws: AwsConfig,
}

/// Load the configuration file; `None` (after logging why) on any error.
pub fn get_config<P: AsRef<Path>>(file_path: P) -> Option<AppConfig> {
    let file_path = file_path.as_ref();
    let loaded = std::fs::read_to_string(file_path)
        .map_err(|e| e.to_string())
        .and_then(|text| serde_yaml::from_str::<AppConfig>(&text).map_err(|e| e.to_string()));
    match loaded {
        Ok(config) => {
            info!("Configuration file loaded successfully.");
            Some(config)
        }
        Err(err) => {
            error!("Error loading configuration: {}", err);
            None
        }
    }
}

/// Label shown when prompting for a feature value.
fn feature_label(name: &str) -> String {
    name.replace('_', " ")
}

/// Interactive prediction loop over any line-based input and output.
pub struct App<'a, R, W> {
    input: R,
    output: W,
    store: &'a dyn ObjectStore,
    aws: &'a AwsConfig,
}

impl<'a, R: BufRead, W: Write> App<'a, R, W> {
    pub fn new(input: R, output: W, store: &'a dyn ObjectStore, aws: &'a AwsConfig) -> Self {
        Self {
            input,
            output,
            store,
            aws,
        }
    }

    /// Run until the user quits or input ends.
    pub fn run(&mut self) -> io::Result<()> {
        writeln!(self.output, "Let's Predict!!!")?;
        if self.aws.model_versions.is_empty() {
            writeln!(self.output, "No model versions configured.")?;
            return Ok(());
        }
        let bucket = self.aws.bucket_name.clone().unwrap_or_default();

        loop {
            let Some(version) = self.choose_version()? else {
                return Ok(());
            };
            info!("Selected model version: {}", version);
            let Some(model) = fetch_model(self.store, &bucket, &self.aws.prefix, &version) else {
                writeln!(self.output, "Model {version} could not be loaded.")?;
                continue;
            };
            info!("Model loaded successfully: {}", version);

            loop {
                let Some(values) = self.read_features(&model)? else {
                    return Ok(());
                };
                match model.predict_one(&values) {
                    Ok(label) => {
                        writeln!(self.output, "For these Features the Prediction is: {label}")?;
                        info!(
                            "Successful prediction with features: {:?} - Prediction: {}",
                            values, label
                        );
                    }
                    Err(err) => {
                        writeln!(self.output, "Error occurred during prediction: {err}")?;
                        error!("Prediction error: {}", err);
                    }
                }
            }
        }
    }

    /// Print `text`, read one trimmed line. `None` on end of input or `q`.
    fn prompt(&mut self, text: &str) -> io::Result<Option<String>> {
        write!(self.output, "{text}")?;
        self.output.flush()?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let line = line.trim();
        if line.eq_ignore_ascii_case("q") {
            return Ok(None);
        }
        Ok(Some(line.to_string()))
    }

    fn choose_version(&mut self) -> io::Result<Option<String>> {
        let aws = self.aws;
        writeln!(self.output, "Which model do you want to use??")?;
        for (i, version) in aws.model_versions.iter().enumerate() {
            writeln!(self.output, "  [{}] {}", i + 1, version)?;
        }
        loop {
            let Some(answer) = self.prompt("Choose Model Version: ")? else {
                return Ok(None);
            };
            let versions = &aws.model_versions;
            let chosen = answer
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|idx| versions.get(idx))
                .or_else(|| versions.iter().find(|v| **v == answer))
                .cloned();
            match chosen {
                Some(version) => return Ok(Some(version)),
                None => writeln!(self.output, "'{answer}' is not one of the listed versions.")?,
            }
        }
    }

    /// One value per model feature; an empty answer counts as 0.
    fn read_features(&mut self, model: &RandomForest) -> io::Result<Option<Vec<f64>>> {
        writeln!(self.output, "Adjust the features as needed")?;
        let mut values = Vec::with_capacity(model.features.len());
        for feature in &model.features {
            let text = format!("{}: ", feature_label(feature));
            loop {
                let Some(answer) = self.prompt(&text)? else {
                    return Ok(None);
                };
                if answer.is_empty() {
                    values.push(0.0);
                    break;
                }
                match answer.parse::<f64>() {
                    Ok(value) => {
                        values.push(value);
                        break;
                    }
                    Err(_) => writeln!(self.output, "'{answer}' is not a number.")?,
                }
            }
        }
        Ok(Some(values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clouds_pipeline::model_io::save_model;
    use clouds_pipeline::models::ForestParams;
    use clouds_pipeline::store::FsStore;
    use clouds_pipeline::table::Table;
    use tempfile::tempdir;

    fn publish_model(store: &FsStore) {
        let x = Table::from_columns(vec![(
            "IR_norm_range",
            (0..20).map(f64::from).collect::<Vec<_>>(),
        )])
        .unwrap();
        let y: Vec<u8> = (0..20).map(|i| u8::from(i >= 10)).collect();
        let params = ForestParams {
            n_estimators: 5,
            max_depth: 3,
            seed: Some(3),
        };
        let model = RandomForest::fit(&x, &y, &params).unwrap();
        let dir = tempdir().unwrap();
        let path = dir.path().join("trained_model_object.json");
        save_model(&model, &path).unwrap();
        store
            .put("clouds", "exp/v1/trained_model_object.json", std::fs::read(&path).unwrap())
            .unwrap();
    }

    fn aws() -> AwsConfig {
        AwsConfig {
            bucket_name: Some("clouds".to_string()),
            prefix: "exp".to_string(),
            model_versions: vec![
                "v0/trained_model_object.json".to_string(),
                "v1/trained_model_object.json".to_string(),
            ],
            ..AwsConfig::default()
        }
    }

    fn session(input: &str) -> String {
        let root = tempdir().unwrap();
        let store = FsStore::new(root.path());
        publish_model(&store);
        let aws = aws();
        let mut output = Vec::new();
        App::new(input.as_bytes(), &mut output, &store, &aws)
            .run()
            .unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_predicts_until_quit() {
        let out = session("2\n1\n18\nq\n");
        assert!(out.contains("[2] v1/trained_model_object.json"));
        assert!(out.contains("IR norm range: "));
        assert!(out.contains("For these Features the Prediction is: 0"));
        assert!(out.contains("For these Features the Prediction is: 1"));
    }

    #[test]
    fn test_bad_answers_are_reprompted() {
        let out = session("7\nv1/trained_model_object.json\nabc\n\nq\n");
        assert!(out.contains("'7' is not one of the listed versions."));
        assert!(out.contains("'abc' is not a number."));
        // empty answer is read as 0
        assert!(out.contains("For these Features the Prediction is: 0"));
    }

    #[test]
    fn test_unloadable_version_returns_to_menu() {
        let out = session("1\nq\n");
        assert!(out.contains("Model v0/trained_model_object.json could not be loaded."));
        assert!(!out.contains("Prediction is"));
    }

    #[test]
    fn test_get_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "aws:\n  s3_bucket: clouds\n  bucket_prefix: exp\n  model_versions: [a, b]\n",
        )
        .unwrap();
        let config = get_config(&path).unwrap();
        assert_eq!(config.aws.bucket_name.as_deref(), Some("clouds"));
        assert_eq!(config.aws.prefix, "exp");
        assert_eq!(config.aws.model_versions, vec!["a", "b"]);

        assert!(get_config(dir.path().join("missing.yaml")).is_none());
        std::fs::write(&path, "aws: [not, a, mapping]\n").unwrap();
        assert!(get_config(&path).is_none());
    }
}
