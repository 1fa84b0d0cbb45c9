//! Line protocol spoken on an `sa-solver` subprocess's stdin/stdout.

/// One parsed line of solver output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SolverLine {
    /// A found solution, forwarded verbatim as a `mining.submit`.
    Sol {
        job_id: String,
        ntime: String,
        nonce_rightpart: String,
        sol: String,
    },
    /// Cumulative counters reported by the solver.
    Status { sols_found: u64, shares_found: u64 },
    /// Anything else, logged at high verbosity.
    Msg(String),
}

/// Banner the solver must print as its first stdout line once mining-ready.
pub const READY_BANNER: &str = "SILENTARMY mining mode ready";

/// Parses one solver stdout line, matched in priority order: `sol:`, then
/// `status:`, then everything else falls back to `Msg`.
pub fn parse_line(line: &str) -> SolverLine {
    let trimmed = line.trim_end_matches(['\r', '\n']);

    if let Some(rest) = strip_tag(trimmed, "sol:") {
        if let Some(sol) = parse_sol(rest) {
            return sol;
        }
    }

    if let Some(rest) = strip_tag(trimmed, "status:") {
        if let Some(status) = parse_status(rest) {
            return status;
        }
    }

    SolverLine::Msg(trimmed.to_string())
}

fn strip_tag<'a>(line: &'a str, tag: &str) -> Option<&'a str> {
    if line.len() < tag.len() {
        return None;
    }
    let (head, rest) = line.split_at(tag.len());
    head.eq_ignore_ascii_case(tag).then(|| rest.trim_start())
}

fn parse_sol(rest: &str) -> Option<SolverLine> {
    let mut tokens = rest.split_whitespace();
    let job_id = tokens.next()?.to_string();
    let ntime = tokens.next()?.to_string();
    let nonce_rightpart = tokens.next()?.to_string();
    let sol = tokens.next()?.to_string();
    if tokens.next().is_some() {
        return None;
    }
    Some(SolverLine::Sol {
        job_id,
        ntime,
        nonce_rightpart,
        sol,
    })
}

fn parse_status(rest: &str) -> Option<SolverLine> {
    let mut tokens = rest.split_whitespace();
    let sols_found: u64 = tokens.next()?.parse().ok()?;
    let shares_found: u64 = tokens.next()?.parse().ok()?;
    if tokens.next().is_some() {
        return None;
    }
    Some(SolverLine::Status {
        sols_found,
        shares_found,
    })
}

/// Formats a job line for the solver's stdin: four lowercase-hex tokens
/// separated by spaces, newline-terminated. Tokens are not validated
/// beyond hex-encoding the bytes given.
pub fn format_job_line(
    target: &[u8],
    job_id: &str,
    header_prefix: &[u8],
    nonce_left: &[u8],
) -> String {
    format!(
        "{} {} {} {}\n",
        hex::encode(target),
        job_id,
        hex::encode(header_prefix),
        hex::encode(nonce_left)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sol_line() {
        let line = "sol: job1 5a000000 deadbeef0011 aabbccdd";
        match parse_line(line) {
            SolverLine::Sol {
                job_id,
                ntime,
                nonce_rightpart,
                sol,
            } => {
                assert_eq!(job_id, "job1");
                assert_eq!(ntime, "5a000000");
                assert_eq!(nonce_rightpart, "deadbeef0011");
                assert_eq!(sol, "aabbccdd");
            }
            other => panic!("expected Sol, got {other:?}"),
        }
    }

    #[test]
    fn parses_sol_line_case_insensitively() {
        let line = "SOL: job1 5a000000 deadbeef0011 aabbccdd";
        assert!(matches!(parse_line(line), SolverLine::Sol { .. }));
    }

    #[test]
    fn parses_status_line() {
        let line = "status: 12 3";
        match parse_line(line) {
            SolverLine::Status {
                sols_found,
                shares_found,
            } => {
                assert_eq!(sols_found, 12);
                assert_eq!(shares_found, 3);
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[test]
    fn falls_back_to_msg() {
        let line = "GPU0: temperature 62C";
        assert_eq!(parse_line(line), SolverLine::Msg(line.to_string()));
    }

    #[test]
    fn malformed_sol_falls_back_to_msg() {
        let line = "sol: job1 onlytwotokens";
        assert!(matches!(parse_line(line), SolverLine::Msg(_)));
    }

    #[test]
    fn format_job_line_is_lowercase_hex_four_tokens() {
        let line = format_job_line(&[0xAB], "job1", &[0xCD, 0xEF], &[0x01]);
        assert_eq!(line, "ab job1 cdef 01\n");
    }
}
