use chrono::Utc;
use clap::Parser;

use crate::{
    cli::{home_assistant::HomeAssistantArgs, source::SourceArgs},
    coefficients::CoefficientStore,
    coordinator::{Coordinator, Phase},
    prelude::*,
    tables::{build_prices_table, build_summary_table},
};

#[derive(Parser)]
pub struct ShowArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    source: SourceArgs,
}

impl ShowArgs {
    #[instrument(skip_all, fields(source_entity = %self.source.entity_id))]
    pub async fn run(self, store: CoefficientStore) -> Result {
        let mut coordinator = Coordinator::builder()
            .upstream(self.home_assistant.connect()?)
            .source_entity(self.source.entity_id)
            .source_type(self.source.source_type)
            .time_zone(self.source.time_zone)
            .store(store.into())
            .build();
        let now = Utc::now().with_timezone(&self.source.time_zone);
        let phase = coordinator.refresh(now).await;
        ensure!(phase == Phase::Published, "the refresh cycle has failed");
        let snapshot = coordinator.handle().snapshot().context("nothing has been published")?;
        println!("{}", build_prices_table(&snapshot));
        println!("{}", build_summary_table(&snapshot));
        Ok(())
    }
}
