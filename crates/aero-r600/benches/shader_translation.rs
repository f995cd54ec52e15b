#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
use aero_r600::ir::{
    Declaration, DstRegister, Instruction, Opcode, ProcessorKind, RegisterFile, Semantic,
    ShaderProgram, SrcRegister, TextureTarget, Token, WriteMask,
};
#[cfg(not(target_arch = "wasm32"))]
use aero_r600::{disasm, translate, ChipFamily, CompileOptions};
#[cfg(not(target_arch = "wasm32"))]
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

#[cfg(not(target_arch = "wasm32"))]
fn io(file: RegisterFile, index: u32, name: Semantic, semantic_index: u32) -> Token {
    Token::Declaration(Declaration::new(file, index, index).semantic(name, semantic_index))
}

#[cfg(not(target_arch = "wasm32"))]
fn inst(opcode: Opcode, dst: DstRegister, srcs: &[SrcRegister]) -> Token {
    let mut inst = Instruction::new(opcode).dst(dst);
    for src in srcs {
        inst = inst.src(*src);
    }
    Token::Instruction(inst)
}

/// Position transform by a 4x4 constant matrix plus a lit colour and a pass-through texcoord.
#[cfg(not(target_arch = "wasm32"))]
fn vertex_program() -> ShaderProgram {
    let input = |i| SrcRegister::new(RegisterFile::Input, i);
    let constant = |i| SrcRegister::new(RegisterFile::Constant, i);
    let temp = |i| SrcRegister::new(RegisterFile::Temporary, i);
    let temp_dst = |i, mask| DstRegister::new(RegisterFile::Temporary, i).mask(mask);

    let mut tokens = vec![
        io(RegisterFile::Input, 0, Semantic::Generic, 0),
        io(RegisterFile::Input, 1, Semantic::Generic, 1),
        io(RegisterFile::Input, 2, Semantic::Generic, 2),
        io(RegisterFile::Output, 0, Semantic::Position, 0),
        io(RegisterFile::Output, 1, Semantic::Color, 0),
        io(RegisterFile::Output, 2, Semantic::Generic, 0),
        Token::Declaration(Declaration::new(RegisterFile::Constant, 0, 7)),
        Token::Declaration(Declaration::new(RegisterFile::Temporary, 0, 2)),
        Token::Immediate([0x3F80_0000, 0x4100_0000, 0, 0]),
    ];
    for (chan, mask) in [WriteMask::X, WriteMask::Y, WriteMask::Z, WriteMask::W]
        .into_iter()
        .enumerate()
    {
        tokens.push(inst(
            Opcode::Dp4,
            temp_dst(0, mask),
            &[input(0), constant(chan as i32)],
        ));
    }
    tokens.extend([
        inst(Opcode::Dp3, temp_dst(1, WriteMask::X), &[input(1), constant(4)]),
        inst(
            Opcode::Max,
            temp_dst(1, WriteMask::X),
            &[temp(1), SrcRegister::new(RegisterFile::Immediate, 0).scalar(2)],
        ),
        inst(
            Opcode::Pow,
            temp_dst(1, WriteMask::Y),
            &[temp(1).scalar(0), SrcRegister::new(RegisterFile::Immediate, 0).scalar(1)],
        ),
        inst(Opcode::Mad, temp_dst(2, WriteMask::all()), &[temp(1).scalar(0), constant(5), constant(6)]),
        inst(
            Opcode::Mov,
            DstRegister::new(RegisterFile::Output, 0),
            &[temp(0)],
        ),
        inst(
            Opcode::Mov,
            DstRegister::new(RegisterFile::Output, 1).mask(WriteMask::all()),
            &[temp(2)],
        ),
        inst(
            Opcode::Mov,
            DstRegister::new(RegisterFile::Output, 2),
            &[input(2)],
        ),
    ]);
    ShaderProgram {
        processor: ProcessorKind::Vertex,
        tokens,
    }
}

/// Textured fragment with a discard and a small branch.
#[cfg(not(target_arch = "wasm32"))]
fn fragment_program() -> ShaderProgram {
    let input = |i| SrcRegister::new(RegisterFile::Input, i);
    let temp = |i| SrcRegister::new(RegisterFile::Temporary, i);
    let temp_dst = |i| DstRegister::new(RegisterFile::Temporary, i);
    let sampler = SrcRegister::new(RegisterFile::Sampler, 0);

    let tokens = vec![
        io(RegisterFile::Input, 0, Semantic::Color, 0),
        io(RegisterFile::Input, 1, Semantic::Generic, 0),
        io(RegisterFile::Output, 0, Semantic::Color, 0),
        Token::Declaration(Declaration::new(RegisterFile::Sampler, 0, 0)),
        Token::Declaration(Declaration::new(RegisterFile::Temporary, 0, 1)),
        Token::Immediate([0x3F00_0000, 0x3F80_0000, 0, 0]),
        Token::Instruction(
            Instruction::new(Opcode::Tex)
                .dst(temp_dst(0))
                .src(input(1))
                .src(sampler)
                .texture(TextureTarget::Tex2D),
        ),
        inst(Opcode::Mul, temp_dst(0), &[temp(0), input(0)]),
        inst(
            Opcode::Slt,
            temp_dst(1).mask(WriteMask::X),
            &[temp(0).scalar(3), SrcRegister::new(RegisterFile::Immediate, 0).scalar(0)],
        ),
        Token::Instruction(Instruction::new(Opcode::If).src(temp(1).scalar(0))),
        Token::Instruction(Instruction::new(Opcode::Kilp)),
        Token::Instruction(Instruction::new(Opcode::Else)),
        inst(Opcode::Sin, temp_dst(1).mask(WriteMask::Y), &[temp(0).scalar(0)]),
        inst(Opcode::Lrp, temp_dst(0), &[temp(1).scalar(1), temp(0), input(0)]),
        Token::Instruction(Instruction::new(Opcode::EndIf)),
        inst(
            Opcode::Mov,
            DstRegister::new(RegisterFile::Output, 0),
            &[temp(0)],
        ),
    ];
    ShaderProgram {
        processor: ProcessorKind::Fragment,
        tokens,
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn bench_translation(c: &mut Criterion) {
    let options = CompileOptions::default();
    let programs = [("vs_transform", vertex_program()), ("fs_textured", fragment_program())];
    let families = [
        ("r600", ChipFamily::R600),
        ("r700", ChipFamily::Rv770),
        ("evergreen", ChipFamily::Cypress),
        ("cayman", ChipFamily::Cayman),
    ];

    let mut group = c.benchmark_group("r600_shader_translation");
    for (program_name, program) in &programs {
        for (family_name, family) in families {
            let id = BenchmarkId::new(*program_name, family_name);
            group.bench_with_input(id, program, |b, program| {
                b.iter(|| {
                    let shader = translate(black_box(program), family, &options).unwrap();
                    black_box(shader.bytecode.len());
                })
            });
        }
    }

    for (family_name, family) in families {
        let shader = translate(&programs[1].1, family, &options).unwrap();
        group.bench_with_input(
            BenchmarkId::new("decode", family_name),
            &shader,
            |b, shader| {
                b.iter(|| {
                    let blocks = disasm::decode(shader.class, black_box(&shader.bytecode)).unwrap();
                    black_box(blocks.len());
                })
            },
        );
    }
    group.finish();
}

#[cfg(not(target_arch = "wasm32"))]
criterion_group!(benches, bench_translation);
#[cfg(not(target_arch = "wasm32"))]
criterion_main!(benches);
