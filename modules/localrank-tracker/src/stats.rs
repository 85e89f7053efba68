use serde::Serialize;

/// Counters from one ranking run.
#[derive(Debug, Default, Clone, Serialize)]
pub struct RunStats {
    pub requests_issued: u32,
    pub interstitials: u32,
    pub primary_hits: u32,
    pub extended_hits: u32,
    pub keywords_not_found: u32,
    pub detail_verifications: u32,
    pub collaborator_failures: u32,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Ranking Run Complete ===")?;
        writeln!(f, "Requests issued:       {}", self.requests_issued)?;
        writeln!(f, "Interstitials hit:     {}", self.interstitials)?;
        writeln!(f, "Found on primary:      {}", self.primary_hits)?;
        writeln!(f, "Found via discovery:   {}", self.extended_hits)?;
        writeln!(f, "Not found:             {}", self.keywords_not_found)?;
        writeln!(f, "Detail verifications:  {}", self.detail_verifications)?;
        writeln!(f, "Collaborator failures: {}", self.collaborator_failures)?;
        Ok(())
    }
}
