use crate::{
    client,
    database::{Database, DatabaseInfo},
    params::Params,
    pir_internals::{branch_opt_util, error::GulliverPIRError, matrix::Matrix, params::SEED_BYTE_LEN},
    server,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Public LWR matrix `A`, of shape m x n with elements uniform modulo 2^log(Q), along with the seed it was expanded from.
#[derive(Clone, Debug, PartialEq)]
pub struct SharedState {
    seed: [u8; SEED_BYTE_LEN],
    pub_mat_a: Matrix,
}

impl SharedState {
    /// Samples a fresh seed and expands the public matrix from it.
    pub fn generate(params: &Params) -> Result<SharedState, GulliverPIRError> {
        let mut rng = ChaCha8Rng::from_os_rng();

        let mut seed = [0u8; SEED_BYTE_LEN];
        rng.fill_bytes(&mut seed);

        Self::from_seed(seed, params)
    }

    /// Deterministically re-derives the public matrix from a known seed, so that it never has to travel over the wire.
    pub fn from_seed(seed: [u8; SEED_BYTE_LEN], params: &Params) -> Result<SharedState, GulliverPIRError> {
        let pub_mat_a = Matrix::generate_from_seed(params.m() as u32, params.n() as u32, &seed, params.log_hint_q())?;
        Ok(SharedState { seed, pub_mat_a })
    }

    #[inline(always)]
    pub const fn seed(&self) -> &[u8; SEED_BYTE_LEN] {
        &self.seed
    }
    #[inline(always)]
    pub const fn pub_mat_a(&self) -> &Matrix {
        &self.pub_mat_a
    }
}

/// Server keeps nothing but the database itself.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ServerState;

/// Secret vector sampled for a single query, needed again when recovering the answer to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientState {
    secret: Matrix,
}

impl ClientState {
    pub(crate) fn new(secret: Matrix) -> ClientState {
        ClientState { secret }
    }

    #[inline(always)]
    pub const fn secret(&self) -> &Matrix {
        &self.secret
    }
}

/// Opaque protocol message, one or more matrices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Msg {
    data: Vec<Matrix>,
}

impl Msg {
    pub fn new(mat: Matrix) -> Msg {
        Msg { data: vec![mat] }
    }

    pub fn from_matrices(data: Vec<Matrix>) -> Msg {
        Msg { data }
    }

    #[inline(always)]
    pub fn matrices(&self) -> &[Matrix] {
        &self.data
    }
    #[inline(always)]
    pub(crate) fn matrices_mut(&mut self) -> &mut Vec<Matrix> {
        &mut self.data
    }

    /// First matrix carried by this message, if any.
    #[inline(always)]
    pub fn first(&self) -> Option<&Matrix> {
        self.data.first()
    }

    /// Number of matrix elements carried, used for bandwidth accounting.
    pub fn size(&self) -> usize {
        self.data.iter().map(|m| m.num_elems()).sum()
    }

    /// Serializes as number of matrices (`u32`, little-endian) followed by each matrix, as in [`Matrix::to_bytes`].
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(std::mem::size_of::<u32>() + self.data.iter().map(|m| m.num_bytes()).sum::<usize>());

        bytes.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        self.data.iter().for_each(|m| bytes.extend_from_slice(&m.to_bytes()));

        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Msg, GulliverPIRError> {
        const U32_LEN: usize = std::mem::size_of::<u32>();

        let read_u32 = |at: usize| -> Option<u32> { bytes.get(at..at + U32_LEN).map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])) };

        let num_mats = read_u32(0).ok_or(GulliverPIRError::FailedToDeserializeMatrixFromBytes)? as usize;
        let mut offset = U32_LEN;
        let mut data = Vec::with_capacity(num_mats.min(bytes.len() / (3 * U32_LEN)));

        for _ in 0..num_mats {
            let rows = read_u32(offset).ok_or(GulliverPIRError::FailedToDeserializeMatrixFromBytes)? as usize;
            let cols = read_u32(offset + U32_LEN).ok_or(GulliverPIRError::FailedToDeserializeMatrixFromBytes)? as usize;

            let mat_byte_len = 2 * U32_LEN + rows * cols * U32_LEN;
            let mat_bytes = bytes.get(offset..offset + mat_byte_len).ok_or(GulliverPIRError::FailedToDeserializeMatrixFromBytes)?;

            data.push(Matrix::from_bytes(mat_bytes)?);
            offset += mat_byte_len;
        }

        if branch_opt_util::unlikely(offset != bytes.len()) {
            return Err(GulliverPIRError::FailedToDeserializeMatrixFromBytes);
        }

        Ok(Msg { data })
    }
}

/// One query message per batch slot, in slot order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BatchOfMsg {
    data: Vec<Msg>,
}

impl BatchOfMsg {
    pub fn new(data: Vec<Msg>) -> BatchOfMsg {
        BatchOfMsg { data }
    }

    pub fn push(&mut self, msg: Msg) {
        self.data.push(msg);
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.data.len()
    }
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
    #[inline(always)]
    pub fn msgs(&self) -> &[Msg] {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.iter().map(|m| m.size()).sum()
    }
}

/// Single-server PIR with preprocessing.
///
/// A round goes `init -> setup -> query (once per batch slot) -> answer -> recover (once per batch slot)`, and `reset`
/// brings the database back to the layout `setup` expects.
pub trait PIR: Sync {
    fn name(&self) -> &'static str;

    /// Samples state shared by client and server, independent of the database content.
    fn init(&self, info: &DatabaseInfo, params: &Params) -> Result<SharedState, GulliverPIRError>;

    /// Offline phase. Preprocesses the database in place and returns the hint to be downloaded by the client.
    fn setup(&self, db: &mut Database, shared: &SharedState, params: &Params) -> Result<(ServerState, Msg), GulliverPIRError>;

    /// Builds a query for record `index`.
    fn query(&self, index: usize, shared: &SharedState, params: &Params, info: &DatabaseInfo) -> Result<(ClientState, Msg), GulliverPIRError>;

    /// Answers a batch of queries, one per slot. The answer carries one vector per slot, in slot order.
    fn answer(&self, db: &Database, queries: &BatchOfMsg, server: &ServerState, shared: &SharedState, params: &Params) -> Result<Msg, GulliverPIRError>;

    /// Same as [`PIR::answer`], but writes into `out`, letting implementations reuse the buffers of a previous answer.
    fn answer_into(
        &self,
        db: &Database,
        queries: &BatchOfMsg,
        server: &ServerState,
        shared: &SharedState,
        params: &Params,
        out: &mut Msg,
    ) -> Result<(), GulliverPIRError> {
        *out = self.answer(db, queries, server, shared, params)?;
        Ok(())
    }

    /// Decodes record `index`, queried in batch slot `slot`, from the answer.
    #[allow(clippy::too_many_arguments)]
    fn recover(
        &self,
        index: usize,
        slot: usize,
        offline: &Msg,
        query: &Msg,
        answer: &Msg,
        shared: &SharedState,
        client: &ClientState,
        params: &Params,
        info: &DatabaseInfo,
    ) -> Result<u64, GulliverPIRError>;

    /// Undoes `setup`, leaving the database as it was before.
    fn reset(&self, db: &mut Database, params: &Params) -> Result<(), GulliverPIRError>;
}

/// LWR based PIR over a squished database, answering a batch of queries in a single pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct GulliverPIR;

impl PIR for GulliverPIR {
    fn name(&self) -> &'static str {
        "GulliverPIR"
    }

    fn init(&self, info: &DatabaseInfo, params: &Params) -> Result<SharedState, GulliverPIRError> {
        if branch_opt_util::unlikely(info.cols() != params.m()) {
            return Err(GulliverPIRError::InvalidHintMatrix);
        }

        SharedState::generate(params)
    }

    fn setup(&self, db: &mut Database, shared: &SharedState, params: &Params) -> Result<(ServerState, Msg), GulliverPIRError> {
        server::setup(db, shared, params)
    }

    fn query(&self, index: usize, shared: &SharedState, params: &Params, info: &DatabaseInfo) -> Result<(ClientState, Msg), GulliverPIRError> {
        client::query(index, shared, params, info)
    }

    fn answer(&self, db: &Database, queries: &BatchOfMsg, _server: &ServerState, _shared: &SharedState, params: &Params) -> Result<Msg, GulliverPIRError> {
        server::answer(db, queries, params)
    }

    fn answer_into(
        &self,
        db: &Database,
        queries: &BatchOfMsg,
        _server: &ServerState,
        _shared: &SharedState,
        params: &Params,
        out: &mut Msg,
    ) -> Result<(), GulliverPIRError> {
        server::answer_into(db, queries, params, out)
    }

    fn recover(
        &self,
        index: usize,
        slot: usize,
        offline: &Msg,
        query: &Msg,
        answer: &Msg,
        _shared: &SharedState,
        client: &ClientState,
        params: &Params,
        info: &DatabaseInfo,
    ) -> Result<u64, GulliverPIRError> {
        client::recover(index, slot, offline, query, answer, client, params, info)
    }

    fn reset(&self, db: &mut Database, params: &Params) -> Result<(), GulliverPIRError> {
        server::reset(db, params)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn public_matrix_can_be_rederived_from_seed() {
        let params = Params::custom(1024, 8, 8, 16, 32, 28, 1 << 9).unwrap();

        let shared = SharedState::generate(&params).unwrap();
        let rederived = SharedState::from_seed(*shared.seed(), &params).unwrap();

        assert_eq!(shared, rederived);
        assert_eq!(shared.pub_mat_a().num_rows(), 16);
        assert_eq!(shared.pub_mat_a().num_cols(), 1024);
    }

    #[test]
    fn message_can_be_serialized() {
        let msg = Msg::from_matrices(vec![
            Matrix::from_values(2, 1, vec![1, 2]).unwrap(),
            Matrix::from_values(1, 3, vec![3, 4, u32::MAX]).unwrap(),
        ]);
        assert_eq!(msg.size(), 5);

        let bytes = msg.to_bytes();
        assert_eq!(Msg::from_bytes(&bytes), Ok(msg));

        assert_eq!(Msg::from_bytes(&bytes[..bytes.len() - 1]), Err(GulliverPIRError::FailedToDeserializeMatrixFromBytes));
        assert_eq!(Msg::from_bytes(&[]), Err(GulliverPIRError::FailedToDeserializeMatrixFromBytes));
    }

    #[test]
    fn batch_size_counts_every_message() {
        let mut batch = BatchOfMsg::default();
        assert!(batch.is_empty());

        batch.push(Msg::new(Matrix::new(3, 1).unwrap()));
        batch.push(Msg::new(Matrix::new(6, 1).unwrap()));

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.size(), 9);
    }
}
