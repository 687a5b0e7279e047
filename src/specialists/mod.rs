pub mod forecast;
pub mod goal;
pub mod math_gen;
pub mod portfolio;
pub mod quant;
pub mod research;
pub mod social;
pub mod whale;

pub use forecast::ForecastingAgent;
pub use goal::GoalPlannerAgent;
pub use math_gen::MathGeneratorAgent;
pub use portfolio::{PortfolioAgent, PortfolioStore};
pub use quant::QuantAgent;
pub use research::ResearchAgent;
pub use social::SocialAgent;
pub use whale::WhaleAgent;
