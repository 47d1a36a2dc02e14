use crate::ingest::JsonLinesSource;
use crate::model::{Principal, Provider};
use crate::pipeline::Pipeline;
use crate::probe::{GatewayProbe, ProviderProbe, ProviderProbes, TimeoutProbe};
use crate::resolver::HttpResolver;
use crate::shutdown::PipelineReport;
use crate::sink::{JsonLinesSink, ResultSink};
use statuser_core::{Config, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub struct App {
    pipeline: Pipeline,
    stream: JsonLinesSource,
}

impl App {
    #[instrument(skip(config))]
    pub async fn new(config: Config) -> Result<Self> {
        info!("Initializing application");

        let resolver = Arc::new(HttpResolver::new(&config.sources)?);
        let probes = build_probes(&config)?;

        let sink: Arc<dyn ResultSink> = match &config.transport.output {
            Some(path) => Arc::new(JsonLinesSink::create(path).await?),
            None => Arc::new(JsonLinesSink::stdout()),
        };

        let identity = Principal {
            org_id: config.transport.org_id.clone(),
            account_number: config.transport.account_number.clone(),
        };
        let stream = match &config.transport.input {
            Some(path) => JsonLinesSource::open(path, identity).await?,
            None => JsonLinesSource::stdin(identity),
        };

        let pipeline = Pipeline::new(
            config.pipeline.clone(),
            config.transport.topic.clone(),
            resolver,
            probes,
            sink,
        );

        Ok(Self { pipeline, stream })
    }

    pub async fn run(self, shutdown: CancellationToken) -> Result<PipelineReport> {
        let mut state = self.pipeline.state();
        tokio::spawn(async move {
            while state.changed().await.is_ok() {
                let current = *state.borrow_and_update();
                info!(state = ?current, "Pipeline state changed");
            }
        });

        self.pipeline.run(self.stream, shutdown).await
    }
}

fn build_probes(config: &Config) -> Result<ProviderProbes> {
    let timeout = Duration::from_secs(config.probe.timeout_secs);
    // The client timeout sits just above the probe deadline so the probe
    // wrapper reports the failure.
    let client = reqwest::Client::builder()
        .timeout(timeout + Duration::from_secs(1))
        .build()?;

    let probe = |provider: Provider| -> Arc<dyn ProviderProbe> {
        Arc::new(TimeoutProbe::new(
            GatewayProbe::new(client.clone(), &config.probe.gateway_url, provider),
            provider,
            timeout,
        ))
    };

    Ok(ProviderProbes {
        aws: probe(Provider::Aws),
        azure: probe(Provider::Azure),
        gcp: probe(Provider::Gcp),
    })
}
