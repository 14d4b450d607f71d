use trending_ranker::error::TrendingError;

#[tokio::main]
async fn main() -> Result<(), TrendingError> {
    trending_ranker::app::run().await
}
